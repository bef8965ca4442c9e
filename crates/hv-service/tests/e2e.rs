use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use base64::{engine::general_purpose::STANDARD as B64, Engine};
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use hv_ledger::builder::{BuilderConfig, PoolContract, TxnBuilder};
use hv_ledger::client::AccountInfo;
use hv_ledger::testutils::{MockLedger, SubmitBehavior};
use hv_ledger::txn::{Authorization, SignedTransaction, Transaction, TxnKind};
use hv_ledger::{BuildError, LedgerClient, TxnConfirmationError};
use hv_service::cleanup::sweep_unconfirmed;
use hv_service::config::{PoolSettings, ServiceConfig};
use hv_service::db::{Db, TxnRecord, TxnType};
use hv_service::flows::{
    encode_signed_txn, ConfirmDeposit, ConfirmWithdrawal, DepositTicket, Service,
};
use hv_service::memstore::{SessionError, SessionStore};
use hv_service::tree::SparseMerkleTree;
use hv_service::ServiceError;
use hv_types::{Address, Note};
use hv_vault::VaultKeypair;

struct Harness {
    _tmp: tempfile::TempDir,
    mock: Arc<MockLedger>,
    db: Arc<Db>,
    service: Arc<Service>,
}

fn addr(c: char) -> Address {
    Address::from_public_key([c as u8; 32])
}

/// Decode one of the ticket's unsigned transactions.
fn unsigned(ticket: &DepositTicket, index: usize) -> Transaction {
    Transaction::decode(&B64.decode(&ticket.txns[index]).unwrap()).unwrap()
}

fn harness() -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let keys = VaultKeypair::generate().unwrap();
    let db = Arc::new(Db::open(&tmp.path().join("e2e.db"), Arc::new(keys.vault())).unwrap());

    let mock = Arc::new(MockLedger::new());
    let client: Arc<dyn LedgerClient> = mock.clone();

    let mut config = ServiceConfig::new(PoolSettings {
        app_id: 77,
        app_address: addr('A'),
        verifier_address: addr('V'),
        verifier_program_path: tmp.path().join("verifier.bin"),
    });
    config.wait_rounds = 3;
    let sessions = Arc::new(SessionStore::new(config.session_ttl));
    let builder = TxnBuilder::new(
        PoolContract {
            app_id: 77,
            app_address: addr('A'),
            verifier_address: addr('V'),
            verifier_program: vec![0x06, 0x81, 0x01],
        },
        BuilderConfig::default(),
    );
    let service = Arc::new(Service::new(
        client,
        db.clone(),
        sessions,
        Arc::new(config),
        builder,
    ));
    Harness {
        _tmp: tmp,
        mock,
        db,
        service,
    }
}

/// What the depositor's wallet sends back: the payment at the signing
/// index with a signature attached.
fn wallet_sign(ticket: &DepositTicket) -> String {
    let signed = SignedTransaction {
        txn: unsigned(ticket, ticket.index_to_sign),
        auth: Authorization::Signature(vec![0x5a; 64]),
    };
    encode_signed_txn(&signed).unwrap()
}

fn confirm_form(ticket: &DepositTicket, depositor: &Address) -> ConfirmDeposit {
    ConfirmDeposit {
        amount: ticket.amount.units,
        address: depositor.clone(),
        note_text: ticket.note_text.clone(),
        signed_txn: wallet_sign(ticket),
    }
}

/// Record a note the way the chain subscriber would, and refresh the root.
fn index_note(db: &Db, leaf_index: u64, note: &Note, txn_id: &str) {
    db.record_txn(&TxnRecord {
        leaf_index,
        commitment: hv_mimc::commitment(note),
        txn_id: txn_id.into(),
        txn_type: TxnType::Deposit,
        amount: note.amount,
        fee: 0,
        from_nullifier: None,
    })
    .unwrap();
    let commitments = db.all_commitments().unwrap();
    let root = SparseMerkleTree::from_commitments(&commitments).root_word();
    db.set_root(&root, commitments.len() as u64).unwrap();
}

#[tokio::test]
async fn deposit_happy_path() {
    let h = harness();
    let depositor = addr('D');
    h.mock.set_next_leaf(4);

    let ticket = h
        .service
        .prepare_deposit(1_000_000, depositor.clone())
        .await
        .unwrap();
    assert_eq!(ticket.txns.len(), 8);
    assert_eq!(ticket.index_to_sign, 1);
    assert_eq!(h.service.sessions().len(), 1);

    let receipt = h
        .service
        .confirm_deposit(confirm_form(&ticket, &depositor))
        .await
        .unwrap();
    assert_eq!(receipt.leaf_index, 4);
    assert_eq!(receipt.amount.units, 1_000_000);

    let note = Note::from_text(&ticket.note_text).unwrap();
    let saved = h.db.confirmed_note(4).unwrap();
    assert_eq!(saved.commitment, hv_mimc::commitment(&note));
    assert_eq!(saved.txn_id, receipt.txn_id);
    assert_eq!(h.db.unconfirmed_count().unwrap(), 0);
    assert!(h.service.sessions().is_empty());

    let group = &h.mock.submitted()[0];
    assert_eq!(group.len(), 8);
    assert!(matches!(group[1].auth, Authorization::Signature(_)));
    assert!(matches!(group[0].auth, Authorization::Program(_)));
}

#[tokio::test]
async fn deposit_below_minimum_is_rejected_before_state() {
    let h = harness();
    let err = h
        .service
        .prepare_deposit(999_999, addr('D'))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Build(BuildError::BelowMinimumDeposit { .. })
    ));
    assert!(h.service.sessions().is_empty());
}

#[tokio::test]
async fn wait_timeout_keeps_note_until_sweep_promotes_it() {
    let h = harness();
    let depositor = addr('D');
    h.mock.set_behavior(SubmitBehavior::NeverConfirm);

    let ticket = h
        .service
        .prepare_deposit(2_000_000, depositor.clone())
        .await
        .unwrap();
    let err = h
        .service
        .confirm_deposit(confirm_form(&ticket, &depositor))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Confirmation {
            error: TxnConfirmationError::WaitTimeout(_),
            ..
        }
    ));
    assert_eq!(err.status().as_u16(), 408);
    assert_eq!(h.db.unconfirmed_count().unwrap(), 1);

    // the group lands later and the subscriber indexes it
    let note = Note::from_text(&ticket.note_text).unwrap();
    index_note(&h.db, 9, &note, "LATE");

    let cancel = CancellationToken::new();
    let report = sweep_unconfirmed(&h.db, Duration::from_secs(3600), 16, &cancel).unwrap();
    assert_eq!(report.promoted, 1);
    assert_eq!(h.db.unconfirmed_count().unwrap(), 0);
    assert!(h.db.confirmed_note(9).is_ok());

    let report = sweep_unconfirmed(&h.db, Duration::ZERO, 16, &cancel).unwrap();
    assert_eq!(report.discarded, 0);
    assert!(h.db.confirmed_note(9).is_ok());
}

#[tokio::test]
async fn rejected_deposit_drops_unconfirmed_note() {
    let h = harness();
    let depositor = addr('D');
    h.mock
        .set_behavior(SubmitBehavior::Reject("logic eval error: assert failed".into()));

    let ticket = h
        .service
        .prepare_deposit(1_500_000, depositor.clone())
        .await
        .unwrap();
    let form = confirm_form(&ticket, &depositor);
    let err = h.service.confirm_deposit(form).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Confirmation {
            error: TxnConfirmationError::Rejected(_),
            ..
        }
    ));
    assert_eq!(h.db.unconfirmed_count().unwrap(), 0);

    // the session was consumed
    let err = h
        .service
        .confirm_deposit(confirm_form(&ticket, &depositor))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Session(SessionError::NotFound)));
}

#[tokio::test]
async fn overspend_reports_max_deposit() {
    let h = harness();
    let depositor = addr('D');
    h.mock.set_account(
        depositor.clone(),
        AccountInfo {
            amount: 3_000_000,
            min_balance: 100_000,
        },
    );
    h.mock.set_behavior(SubmitBehavior::Reject(
        "TransactionPool.Remember: overspend".into(),
    ));

    let ticket = h
        .service
        .prepare_deposit(5_000_000, depositor.clone())
        .await
        .unwrap();
    let err = h
        .service
        .confirm_deposit(confirm_form(&ticket, &depositor))
        .await
        .unwrap_err();
    match err {
        ServiceError::Confirmation {
            error: TxnConfirmationError::OverSpend(_),
            max_amount: Some(max),
        } => assert_eq!(max.units, 3_000_000 - 100_000 - 56 * 1_000),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn mismatched_form_is_a_validation_error() {
    let h = harness();
    let depositor = addr('D');
    let ticket = h
        .service
        .prepare_deposit(1_000_000, depositor.clone())
        .await
        .unwrap();
    let mut form = confirm_form(&ticket, &depositor);
    form.amount += 1;
    let err = h.service.confirm_deposit(form).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    assert!(h.mock.submitted().is_empty());
    assert_eq!(h.db.unconfirmed_count().unwrap(), 0);
}

#[tokio::test]
async fn tampered_payment_is_refused() {
    let h = harness();
    let depositor = addr('D');
    let ticket = h
        .service
        .prepare_deposit(1_000_000, depositor.clone())
        .await
        .unwrap();
    let mut txn = unsigned(&ticket, 1);
    txn.fee += 1;
    let signed = encode_signed_txn(&SignedTransaction {
        txn,
        auth: Authorization::Signature(vec![1; 64]),
    })
    .unwrap();
    let form = ConfirmDeposit {
        signed_txn: signed,
        ..confirm_form(&ticket, &depositor)
    };
    let err = h.service.confirm_deposit(form).await.unwrap_err();
    assert!(matches!(err, ServiceError::Build(BuildError::SignedTxnMismatch)));
    assert_eq!(err.status().as_u16(), 400);
    assert!(h.mock.submitted().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_confirms_submit_once() {
    let h = harness();
    let depositor = addr('D');
    let ticket = h
        .service
        .prepare_deposit(1_000_000, depositor.clone())
        .await
        .unwrap();

    let tasks: Vec<_> = (0..6)
        .map(|_| {
            let service = h.service.clone();
            let form = confirm_form(&ticket, &depositor);
            tokio::spawn(async move { service.confirm_deposit(form).await.is_ok() })
        })
        .collect();
    let mut ok = 0;
    for t in tasks {
        if t.await.unwrap() {
            ok += 1;
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(h.mock.submitted().len(), 1);
}

async fn deposited_note(h: &Harness, amount: u64) -> (Note, u64) {
    let depositor = addr('D');
    let ticket = h
        .service
        .prepare_deposit(amount, depositor.clone())
        .await
        .unwrap();
    let receipt = h
        .service
        .confirm_deposit(confirm_form(&ticket, &depositor))
        .await
        .unwrap();
    let note = Note::from_text(&ticket.note_text).unwrap();
    index_note(&h.db, receipt.leaf_index, &note, &receipt.txn_id);
    (note, receipt.leaf_index)
}

#[tokio::test]
async fn withdrawal_with_change_note() {
    let h = harness();
    let (note, leaf) = deposited_note(&h, 1_000_000).await;
    let recipient = addr('R');

    let data = h
        .service
        .prepare_withdrawal(500_000, recipient.clone(), &note.text())
        .unwrap();
    assert_eq!(data.from_note.leaf_index(), Some(leaf));
    assert_eq!(data.fee.units, 75_300);
    assert_eq!(data.change_note.amount, 1_000_000 - 500_000 - 75_300);

    let receipt = h
        .service
        .confirm_withdrawal(ConfirmWithdrawal {
            amount: 500_000,
            address: recipient,
            note_text: note.text(),
            change_note_text: data.change_note.text(),
            proof: vec![0xab; 64],
        })
        .await
        .unwrap();
    assert_eq!(receipt.change_amount.units, 424_700);
    assert_eq!(receipt.fee.units, 75_300);

    let change = h.db.confirmed_note(receipt.change_leaf_index).unwrap();
    assert_eq!(change.commitment, hv_mimc::commitment(&data.change_note));
    assert_eq!(h.db.unconfirmed_count().unwrap(), 0);

    let submitted = h.mock.submitted();
    let withdrawal = submitted.last().unwrap();
    assert!(withdrawal
        .iter()
        .all(|s| matches!(s.auth, Authorization::Program(_))));
    match &withdrawal[0].txn.kind {
        TxnKind::AppCall { accounts, args, .. } => {
            assert_eq!(accounts, &vec![addr('R')]);
            assert_eq!(args.len(), 6);
            // change remains, so no_change is false
            assert_eq!(args[5], vec![0x00]);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn withdrawal_validation() {
    let h = harness();
    let (note, _) = deposited_note(&h, 1_000_000).await;

    let unknown = Note::generate(1_000_000).unwrap();
    assert!(matches!(
        h.service.prepare_withdrawal(1, addr('R'), &unknown.text()),
        Err(ServiceError::InvalidNote)
    ));
    assert!(matches!(
        h.service.prepare_withdrawal(1, addr('R'), "not a note"),
        Err(ServiceError::InvalidNote)
    ));
    match h.service.prepare_withdrawal(1_000_000, addr('R'), &note.text()) {
        Err(ServiceError::NoteTooSmall { max_withdrawal }) => {
            assert_eq!(max_withdrawal.units, 924_700)
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn withdrawal_refuses_stale_root() {
    let h = harness();
    let (note, _) = deposited_note(&h, 1_000_000).await;
    h.db.set_root(&[0u8; 32], 1).unwrap();

    let data = h
        .service
        .prepare_withdrawal(100_000, addr('R'), &note.text())
        .unwrap();
    let before = h.mock.submitted().len();
    let err = h
        .service
        .confirm_withdrawal(ConfirmWithdrawal {
            amount: 100_000,
            address: addr('R'),
            note_text: note.text(),
            change_note_text: data.change_note.text(),
            proof: vec![1; 64],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Internal(_)));
    assert_eq!(h.mock.submitted().len(), before);
    assert_eq!(h.db.unconfirmed_count().unwrap(), 0);
}

#[tokio::test]
async fn merkle_witness_matches_tree() {
    let h = harness();
    let (first, _) = deposited_note(&h, 1_000_000).await;
    let (_second, _) = deposited_note(&h, 2_000_000).await;

    let witness = h.service.merkle_witness(0).unwrap();
    let (root, count) = h.service.root().unwrap();
    assert_eq!(witness.root, root);
    assert_eq!(count, 2);
    assert_eq!(witness.siblings.len(), hv_types::MERKLE_TREE_LEVELS);

    let path = hv_service::tree::MerklePath {
        siblings: witness
            .siblings
            .iter()
            .map(hv_mimc::word_to_fr)
            .collect(),
        indices: witness.indices.clone(),
    };
    let leaf = hv_mimc::word_to_fr(&hv_mimc::commitment(&first));
    assert!(hv_service::tree::verify_proof(
        leaf,
        &path,
        &hv_mimc::word_to_fr(&root)
    ));
}

// ── HTTP ─────────────────────────────────────────────────────────────

async fn call(
    app: &axum::Router,
    req: axum::http::Request<Body>,
) -> (axum::http::StatusCode, axum::http::HeaderMap, serde_json::Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, headers, json)
}

fn get(uri: &str) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post(uri: &str, body: serde_json::Value) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn http_smoke() {
    let h = harness();
    let depositor = addr('D');
    h.mock.set_account(
        depositor.clone(),
        AccountInfo {
            amount: 10_000_000,
            min_balance: 100_000,
        },
    );
    let app = hv_service::api::router(h.service.clone());

    let (status, headers, json) = call(&app, get("/v1/health")).await;
    assert_eq!(status, 200);
    assert_eq!(json["status"], "ok");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");

    let (status, headers, json) = call(&app, get("/v1/stats")).await;
    assert_eq!(status, 200);
    assert!(headers.contains_key("cache-control"));
    assert_eq!(json["deposit_count"], 0);
    assert_eq!(json["tvl"]["units"], 0);

    // no root written yet
    let (status, _, _) = call(&app, get("/v1/root")).await;
    assert_eq!(status, 500);

    let uri = format!("/v1/max-deposit/{depositor}");
    let (status, _, json) = call(&app, get(&uri)).await;
    assert_eq!(status, 200);
    assert_eq!(json["max_amount"]["units"], 10_000_000 - 100_000 - 56_000);

    let (status, _, json) = call(
        &app,
        post(
            "/v1/deposit",
            serde_json::json!({ "amount": "1.5", "address": depositor.to_string() }),
        ),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json["amount"]["units"], 1_500_000);
    assert_eq!(json["index_to_sign"], 1);
    assert_eq!(json["txns"].as_array().unwrap().len(), 8);
    let payment = B64.decode(json["txns"][1].as_str().unwrap()).unwrap();
    let payment = Transaction::decode(&payment).unwrap();
    assert_eq!(payment.sender, depositor);
    assert!(matches!(
        payment.kind,
        TxnKind::Payment { amount: 1_500_000, .. }
    ));
    let note_text = json["note_text"].as_str().unwrap().to_string();
    assert_eq!(Note::from_text(&note_text).unwrap().amount, 1_500_000);

    let (status, _, json) = call(
        &app,
        post(
            "/v1/deposit",
            serde_json::json!({ "amount": "1", "address": "nope" }),
        ),
    )
    .await;
    assert_eq!(status, 422);
    assert!(json["remedy"].is_string());

    let (status, _, json) = call(
        &app,
        post(
            "/v1/confirm-deposit",
            serde_json::json!({
                "amount": "1.5",
                "address": depositor.to_string(),
                "note": note_text,
                "signed_txn": "%%%",
            }),
        ),
    )
    .await;
    assert_eq!(status, 400);
    assert!(json["error"].as_str().unwrap().contains("malformed"));
}
