//! Per-instrument fetch cursors: the last date whose bars are known to be
//! fetched. Each `set` is written through immediately.

use chrono::NaiveDate;

use crate::store::{BlobStore, StoreError};

pub const CURSOR_NAMESPACE: &str = "cursor";

pub struct CursorStore<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: BlobStore + ?Sized> CursorStore<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn get(&self, code: &str) -> Result<Option<NaiveDate>, StoreError> {
        let Some(bytes) = self.store.get(CURSOR_NAMESPACE, code)? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&bytes);
        NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                namespace: CURSOR_NAMESPACE.to_string(),
                key: code.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn set(&self, code: &str, date: NaiveDate) -> Result<(), StoreError> {
        let text = date.format("%Y-%m-%d").to_string();
        self.store.put(CURSOR_NAMESPACE, code, text.as_bytes())
    }

    pub fn delete(&self, code: &str) -> Result<(), StoreError> {
        self.store.delete(CURSOR_NAMESPACE, code)
    }

    /// Puts the cursor back to `previous`, removing it when there was none.
    pub fn restore(&self, code: &str, previous: Option<NaiveDate>) -> Result<(), StoreError> {
        match previous {
            Some(date) => self.set(code, date),
            None => self.delete(code),
        }
    }

    /// All cursors, ordered by instrument code.
    pub fn list(&self) -> Result<Vec<(String, NaiveDate)>, StoreError> {
        let mut out = Vec::new();
        for code in self.store.keys(CURSOR_NAMESPACE)? {
            if let Some(date) = self.get(&code)? {
                out.push((code, date));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn absent_cursor_is_none() {
        let store = MemoryStore::new();
        let cursors = CursorStore::new(&store);
        assert_eq!(cursors.get("6501").unwrap(), None);
    }

    #[test]
    fn set_then_get() {
        let store = MemoryStore::new();
        let cursors = CursorStore::new(&store);
        cursors.set("6501", date(2024, 1, 12)).unwrap();
        assert_eq!(cursors.get("6501").unwrap(), Some(date(2024, 1, 12)));
        assert_eq!(
            store.get(CURSOR_NAMESPACE, "6501").unwrap(),
            Some(b"2024-01-12".to_vec())
        );
    }

    #[test]
    fn restore_deletes_when_previous_absent() {
        let store = MemoryStore::new();
        let cursors = CursorStore::new(&store);
        cursors.set("6501", date(2024, 1, 12)).unwrap();
        cursors.restore("6501", None).unwrap();
        assert_eq!(cursors.get("6501").unwrap(), None);

        cursors.set("7203", date(2024, 1, 12)).unwrap();
        cursors.restore("7203", Some(date(2024, 1, 10))).unwrap();
        assert_eq!(cursors.get("7203").unwrap(), Some(date(2024, 1, 10)));
    }

    #[test]
    fn garbage_cursor_is_corrupt() {
        let store = MemoryStore::new();
        store.put(CURSOR_NAMESPACE, "6501", b"yesterday").unwrap();
        let cursors = CursorStore::new(&store);
        assert!(matches!(
            cursors.get("6501"),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn list_is_sorted_by_code() {
        let store = MemoryStore::new();
        let cursors = CursorStore::new(&store);
        cursors.set("7203", date(2024, 1, 10)).unwrap();
        cursors.set("1301", date(2024, 1, 11)).unwrap();
        assert_eq!(
            cursors.list().unwrap(),
            vec![
                ("1301".to_string(), date(2024, 1, 11)),
                ("7203".to_string(), date(2024, 1, 10)),
            ]
        );
    }
}
