//! sbx-pipeline: the two halves of the dispersal pipeline
//!
//! Producer: `FileStore::store_secret_file` — encrypt under a fresh
//! ephemeral key, disperse the ciphertext into randomly-sized chunks,
//! announce the manifest on the queue.
//!
//! Consumer: `Reconstructor::handle` — parse a delivered manifest, fetch
//! the chunks back in manifest order, decrypt, persist the plaintext.
//!
//! Key custody is a seam (`KeyCustody`): the default embeds the serialized
//! private key in the manifest, trading confidentiality against queue
//! readers for a self-contained manifest. See DESIGN.md.

pub mod custody;
pub mod reconstruct;
pub mod store;

pub use custody::{EmbeddedCustody, KeyCustody};
pub use reconstruct::Reconstructor;
pub use store::{FileStore, StoreReceipt};
