use ark_bn254::Fr;
use ark_ff::AdditiveGroup;
use hv_mimc::{fr_to_word, hash2, word_to_fr, Word};
use hv_types::MERKLE_TREE_LEVELS;

/// Authentication path from a leaf to the root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerklePath {
    pub siblings: Vec<Fr>,
    /// `true` where the node on the path is a right child.
    pub indices: Vec<bool>,
}

/// Append-only commitment tree, rebuilt from the persisted leaves.
pub struct SparseMerkleTree {
    leaves: Vec<Fr>,
    zeros: Vec<Fr>,
}

impl Default for SparseMerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseMerkleTree {
    pub fn new() -> Self {
        let mut zeros = vec![Fr::ZERO; MERKLE_TREE_LEVELS + 1];
        for i in 1..=MERKLE_TREE_LEVELS {
            zeros[i] = hash2(zeros[i - 1], zeros[i - 1]);
        }
        Self {
            leaves: Vec::new(),
            zeros,
        }
    }

    pub fn from_commitments(commitments: &[Word]) -> Self {
        let mut tree = Self::new();
        for c in commitments {
            tree.insert(word_to_fr(c));
        }
        tree
    }

    pub fn insert(&mut self, leaf: Fr) -> usize {
        let idx = self.leaves.len();
        self.leaves.push(leaf);
        idx
    }

    pub fn next_index(&self) -> usize {
        self.leaves.len()
    }

    pub fn root(&self) -> Fr {
        if self.leaves.is_empty() {
            return self.zeros[MERKLE_TREE_LEVELS];
        }
        let mut layer = self.leaves.clone();
        for level in 0..MERKLE_TREE_LEVELS {
            layer = self.next_layer(&layer, level);
        }
        layer[0]
    }

    pub fn root_word(&self) -> Word {
        fr_to_word(&self.root())
    }

    pub fn proof(&self, index: usize) -> Option<MerklePath> {
        if index >= self.leaves.len() {
            return None;
        }
        let mut siblings = Vec::with_capacity(MERKLE_TREE_LEVELS);
        let mut indices = Vec::with_capacity(MERKLE_TREE_LEVELS);
        let mut layer = self.leaves.clone();
        let mut idx = index;

        for level in 0..MERKLE_TREE_LEVELS {
            let is_right = idx & 1 == 1;
            indices.push(is_right);
            let sibling_idx = if is_right { idx - 1 } else { idx + 1 };
            siblings.push(layer.get(sibling_idx).copied().unwrap_or(self.zeros[level]));

            layer = self.next_layer(&layer, level);
            idx /= 2;
        }

        Some(MerklePath { siblings, indices })
    }

    fn next_layer(&self, layer: &[Fr], level: usize) -> Vec<Fr> {
        let zero = self.zeros[level];
        layer
            .chunks(2)
            .map(|pair| hash2(pair[0], pair.get(1).copied().unwrap_or(zero)))
            .collect()
    }
}

pub fn verify_proof(leaf: Fr, path: &MerklePath, root: &Fr) -> bool {
    let mut current = leaf;
    for (sibling, is_right) in path.siblings.iter().zip(&path.indices) {
        current = if *is_right {
            hash2(*sibling, current)
        } else {
            hash2(current, *sibling)
        };
    }
    current == *root
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::UniformRand;

    #[test]
    fn empty_root_deterministic() {
        assert_eq!(SparseMerkleTree::new().root(), SparseMerkleTree::new().root());
    }

    #[test]
    fn empty_subtrees_hash_pairs_of_zero() {
        let tree = SparseMerkleTree::new();
        assert_eq!(
            hex::encode(fr_to_word(&tree.zeros[1])),
            "29a1ce46748dd1f268a52b64670d2dd170487b0eabfdf8e3280c52996af03561"
        );
    }

    #[test]
    fn single_insert_changes_root() {
        let mut tree = SparseMerkleTree::new();
        let empty_root = tree.root();
        let mut rng = ark_std::test_rng();
        tree.insert(Fr::rand(&mut rng));
        assert_ne!(tree.root(), empty_root);
    }

    #[test]
    fn all_proofs_verify() {
        let mut tree = SparseMerkleTree::new();
        let mut rng = ark_std::test_rng();
        let leaves: Vec<Fr> = (0..7).map(|_| Fr::rand(&mut rng)).collect();
        for l in &leaves {
            tree.insert(*l);
        }
        let root = tree.root();
        for (i, leaf) in leaves.iter().enumerate() {
            let proof = tree.proof(i).unwrap();
            assert_eq!(proof.siblings.len(), MERKLE_TREE_LEVELS);
            assert!(verify_proof(*leaf, &proof, &root), "proof failed for index {i}");
        }
        assert!(tree.proof(7).is_none());
    }

    #[test]
    fn wrong_leaf_does_not_verify() {
        let mut rng = ark_std::test_rng();
        let mut tree = SparseMerkleTree::new();
        tree.insert(Fr::rand(&mut rng));
        tree.insert(Fr::rand(&mut rng));
        let proof = tree.proof(1).unwrap();
        assert!(!verify_proof(Fr::rand(&mut rng), &proof, &tree.root()));
    }

    #[test]
    fn rebuild_from_commitment_words() {
        let mut rng = ark_std::test_rng();
        let leaves: Vec<Fr> = (0..4).map(|_| Fr::rand(&mut rng)).collect();
        let words: Vec<Word> = leaves.iter().map(fr_to_word).collect();

        let mut direct = SparseMerkleTree::new();
        for l in &leaves {
            direct.insert(*l);
        }
        let rebuilt = SparseMerkleTree::from_commitments(&words);
        assert_eq!(rebuilt.root(), direct.root());
        assert_eq!(rebuilt.root_word(), fr_to_word(&direct.root()));
    }
}
