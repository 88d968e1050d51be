//! Key-value persistence trait
//!
//! The non-volatile store is an external collaborator with Preferences-like
//! semantics: typed getters return the caller's default on a missing key,
//! and writes are transactional per key. One store instance corresponds to
//! one namespace.

/// Typed key-value store over one namespace
pub trait KvStore {
    /// Read a u8, returning `default` when the key is missing
    fn get_u8(&self, key: &str, default: u8) -> u8;
    fn put_u8(&mut self, key: &str, value: u8);

    fn get_u16(&self, key: &str, default: u16) -> u16;
    fn put_u16(&mut self, key: &str, value: u16);

    fn get_u32(&self, key: &str, default: u32) -> u32;
    fn put_u32(&mut self, key: &str, value: u32);

    fn get_bool(&self, key: &str, default: bool) -> bool;
    fn put_bool(&mut self, key: &str, value: bool);

    /// Copy a blob into `out`; `None` when the key is missing or `out` is
    /// too small for the stored value
    fn get_bytes(&self, key: &str, out: &mut [u8]) -> Option<usize>;

    /// Store a blob; false when the store refused the write
    fn put_bytes(&mut self, key: &str, data: &[u8]) -> bool;

    /// Stored length of a blob, 0 when missing
    fn bytes_len(&self, key: &str) -> usize;
}
