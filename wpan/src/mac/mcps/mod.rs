//! MAC common part sublayer: data transfer.
pub mod data;
