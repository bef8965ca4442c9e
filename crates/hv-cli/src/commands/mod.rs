pub mod decrypt;
pub mod fee;
pub mod keygen;
pub mod note;
