//! 通用 LRU 缓存实现
//!
//! - 容量限制：超过容量淘汰最早写入的项，重新写入会移到队尾
//! - 可选 TTL：设置后条目按插入时间过期
//!
//! `peek` 不刷新访问顺序，只需要 `&self`，可以在读锁下调用。

use linked_hash_map::LinkedHashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.is_some_and(|ttl| self.inserted_at.elapsed() > ttl)
    }
}

/// LRU 缓存
///
/// 使用 `LinkedHashMap` 维护写入顺序，队首为最早写入的项。
#[derive(Debug)]
pub struct LruCache<K: Eq + Hash, V> {
    cache: LinkedHashMap<K, CacheEntry<V>>,
    capacity: usize,
    ttl: Option<Duration>,
}

impl<K: Eq + Hash, V> LruCache<K, V> {
    /// 创建缓存，`ttl` 为 `None` 时条目不过期
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            cache: LinkedHashMap::new(),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// 只读获取，不刷新顺序；过期条目视为不存在
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.cache
            .get(key)
            .filter(|entry| !entry.is_expired(self.ttl))
            .map(|entry| &entry.value)
    }

    /// 插入或替换，超过容量时淘汰队首
    pub fn insert(&mut self, key: K, value: V) {
        if self.cache.remove(&key).is_none() && self.cache.len() >= self.capacity {
            self.cache.pop_front();
        }
        self.cache.insert(key, CacheEntry::new(value));
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.cache.remove(key).map(|entry| entry.value)
    }

    /// 删除所有不满足条件的项，返回删除数量
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&K) -> bool,
        K: Clone,
    {
        let doomed: Vec<K> = self
            .cache
            .iter()
            .filter(|(key, _)| !keep(key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            self.cache.remove(key);
        }
        doomed.len()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
