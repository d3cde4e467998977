//! Object id generation.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// A fresh alphanumeric object id.
pub fn new_object_id(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_shape() {
        let id = new_object_id(10);
        assert_eq!(id.len(), 10);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_object_ids_differ() {
        assert_ne!(new_object_id(10), new_object_id(10));
    }
}
