pub(crate) mod block;
pub(crate) mod file;
pub(crate) mod tree;
pub(crate) mod wal;
