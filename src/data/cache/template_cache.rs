//! SQL 模板缓存
//!
//! 以 (database, query_ref) 为键缓存 `Arc<SqlTemplate>`，跨请求共享：
//! - 命中只持有读锁
//! - 同一个键的并发未命中在该键的加载锁上串行，只加载一次
//! - 未找到的模板不缓存

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

use super::lru::LruCache;
use crate::data::managers::TemplateSource;
use crate::data::{DataError, Result};
use crate::models::SqlTemplate;

pub type TemplateKey = (String, i64);

pub struct QueryCache {
    entries: RwLock<LruCache<TemplateKey, Arc<SqlTemplate>>>,
    loading: Mutex<HashMap<TemplateKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl QueryCache {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity, ttl)),
            loading: Mutex::new(HashMap::new()),
        }
    }

    /// 只查缓存，不触发加载
    pub fn get(&self, database: &str, query_ref: i64) -> Result<Option<Arc<SqlTemplate>>> {
        let key = (database.to_string(), query_ref);
        self.lookup(&key)
    }

    /// 查缓存，未命中时通过 `source` 加载并写入
    pub async fn get_or_load(
        &self,
        database: &str,
        query_ref: i64,
        source: &dyn TemplateSource,
    ) -> Result<Option<Arc<SqlTemplate>>> {
        let key = (database.to_string(), query_ref);
        if let Some(template) = self.lookup(&key)? {
            return Ok(Some(template));
        }

        // 先释放互斥锁，再归还加载槽
        let (_slot, _permit) = LoadSlot::acquire(self, &key).await?;

        // 等锁期间可能已被其他请求加载
        if let Some(template) = self.lookup(&key)? {
            return Ok(Some(template));
        }

        match source.load_template(database, query_ref).await {
            // 写入缓存发生在释放加载锁之前，后来者的复查一定能命中
            Ok(Some(template)) => self.store(key.clone(), template),
            Ok(None) => {
                tracing::debug!(database, query_ref, "SQL 模板不存在");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn store(&self, key: TemplateKey, template: SqlTemplate) -> Result<Option<Arc<SqlTemplate>>> {
        let template = Arc::new(template);
        self.entries
            .write()
            .map_err(|e| DataError::Concurrency(e.to_string()))?
            .insert(key, Arc::clone(&template));
        tracing::debug!(
            database = %template.database,
            query_ref = template.query_ref,
            "SQL 模板已加载并缓存"
        );
        Ok(Some(template))
    }

    pub fn invalidate(&self, database: &str, query_ref: i64) -> Result<bool> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| DataError::Concurrency(e.to_string()))?;
        Ok(entries.remove(&(database.to_string(), query_ref)).is_some())
    }

    /// 使某个数据库的全部模板失效，返回失效数量
    pub fn invalidate_database(&self, database: &str) -> Result<usize> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| DataError::Concurrency(e.to_string()))?;
        let removed = entries.retain(|(db, _)| db != database);
        if removed > 0 {
            tracing::info!(database, removed, "数据库模板缓存已失效");
        }
        Ok(removed)
    }

    pub fn clear(&self) -> Result<()> {
        self.entries
            .write()
            .map_err(|e| DataError::Concurrency(e.to_string()))?
            .clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &TemplateKey) -> Result<Option<Arc<SqlTemplate>>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| DataError::Concurrency(e.to_string()))?;
        Ok(entries.peek(key).cloned())
    }

    #[cfg(test)]
    fn loading_count(&self) -> usize {
        self.loading.lock().map(|loading| loading.len()).unwrap_or(0)
    }
}

/// 某个键的加载槽
///
/// 无论以何种方式退出（命中、未找到、出错、被取消）都会在 drop 时归还；
/// 只有映射中仍是同一把锁且没有其他等待者时才删除条目。
struct LoadSlot<'a> {
    cache: &'a QueryCache,
    key: &'a TemplateKey,
    lock: Option<Arc<tokio::sync::Mutex<()>>>,
}

impl<'a> LoadSlot<'a> {
    async fn acquire(
        cache: &'a QueryCache,
        key: &'a TemplateKey,
    ) -> Result<(LoadSlot<'a>, OwnedMutexGuard<()>)> {
        let lock = {
            let mut loading = cache
                .loading
                .lock()
                .map_err(|e| DataError::Concurrency(e.to_string()))?;
            Arc::clone(loading.entry(key.clone()).or_default())
        };
        let slot = LoadSlot {
            cache,
            key,
            lock: Some(Arc::clone(&lock)),
        };
        let permit = lock.lock_owned().await;
        Ok((slot, permit))
    }
}

impl Drop for LoadSlot<'_> {
    fn drop(&mut self) {
        let Some(lock) = self.lock.take() else {
            return;
        };
        let Ok(mut loading) = self.cache.loading.lock() else {
            return;
        };
        let ours = loading
            .get(self.key)
            .is_some_and(|current| Arc::ptr_eq(current, &lock));
        drop(lock);
        // 只剩映射自身的引用时说明没有其他等待者
        let idle = ours
            && loading
                .get(self.key)
                .is_some_and(|current| Arc::strong_count(current) == 1);
        if idle {
            loading.remove(self.key);
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(4096, None)
    }
}
