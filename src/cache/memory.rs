//! In-process [`CandleStore`] backed by a map of deques.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::CandleStore;
use crate::Result;

/// Keeps every list in memory. Useful for tests and cache-less runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    lists: Mutex<HashMap<String, VecDeque<String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lists(&self) -> MutexGuard<'_, HashMap<String, VecDeque<String>>> {
        self.lists.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CandleStore for MemoryStore {
    async fn size(&self, key: &str) -> Result<usize> {
        Ok(self.lists().get(key).map_or(0, VecDeque::len))
    }

    async fn front(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lists().get(key).and_then(|list| list.front().cloned()))
    }

    async fn push_front(&self, key: &str, items: &[String]) -> Result<()> {
        let mut lists = self.lists();
        let list = lists.entry(key.to_string()).or_default();
        for item in items {
            list.push_front(item.clone());
        }
        Ok(())
    }

    async fn push_back(&self, key: &str, items: &[String]) -> Result<()> {
        let mut lists = self.lists();
        lists
            .entry(key.to_string())
            .or_default()
            .extend(items.iter().cloned());
        Ok(())
    }

    async fn pop_back(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lists().get_mut(key).and_then(VecDeque::pop_back))
    }

    async fn get_all(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .lists()
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.lists().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn push_front_leaves_last_item_first() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            store.push_back("k", &items(&["b", "a"])).await.unwrap();
            store.push_front("k", &items(&["c", "d"])).await.unwrap();

            assert_eq!(store.get_all("k").await.unwrap(), items(&["d", "c", "b", "a"]));
            assert_eq!(store.front("k").await.unwrap().as_deref(), Some("d"));
            assert_eq!(store.size("k").await.unwrap(), 4);
        });
    }

    #[test]
    fn pop_back_and_clear() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            store.push_back("k", &items(&["b", "a"])).await.unwrap();

            assert_eq!(store.pop_back("k").await.unwrap().as_deref(), Some("a"));
            store.clear("k").await.unwrap();
            assert_eq!(store.size("k").await.unwrap(), 0);
            assert!(store.front("k").await.unwrap().is_none());
            assert!(store.pop_back("k").await.unwrap().is_none());
        });
    }
}
