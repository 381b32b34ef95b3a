use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{
    build_query, build_visualization, NewQuery, NewVisualization, QueryRecord, QueryUpdate,
    Storage, StorageError, Visualization,
};

/// Map-backed storage; contents live only as long as the process.
#[derive(Default)]
pub struct MemStorage {
    queries: RwLock<HashMap<String, QueryRecord>>,
    visualizations: RwLock<HashMap<String, Visualization>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut queries: Vec<QueryRecord>) -> Vec<QueryRecord> {
    queries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    queries
}

#[async_trait]
impl Storage for MemStorage {
    async fn create_query(&self, query: NewQuery) -> Result<QueryRecord, StorageError> {
        let record = build_query(query);
        self.queries
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get_query(&self, id: &str) -> Result<Option<QueryRecord>, StorageError> {
        Ok(self.queries.read().await.get(id).cloned())
    }

    async fn list_queries(&self) -> Result<Vec<QueryRecord>, StorageError> {
        let queries = self.queries.read().await.values().cloned().collect();
        Ok(newest_first(queries))
    }

    async fn update_query(
        &self,
        id: &str,
        update: QueryUpdate,
    ) -> Result<Option<QueryRecord>, StorageError> {
        let mut queries = self.queries.write().await;
        Ok(queries.get_mut(id).map(|record| {
            update.apply(record);
            record.clone()
        }))
    }

    async fn delete_query(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self.queries.write().await.remove(id).is_some())
    }

    async fn saved_queries(&self) -> Result<Vec<QueryRecord>, StorageError> {
        let saved = self
            .queries
            .read()
            .await
            .values()
            .filter(|q| q.is_saved)
            .cloned()
            .collect();
        Ok(newest_first(saved))
    }

    async fn create_visualization(
        &self,
        viz: NewVisualization,
    ) -> Result<Visualization, StorageError> {
        let record = build_visualization(viz);
        self.visualizations
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get_visualization(&self, id: &str) -> Result<Option<Visualization>, StorageError> {
        Ok(self.visualizations.read().await.get(id).cloned())
    }

    async fn visualizations_for_query(
        &self,
        query_id: &str,
    ) -> Result<Vec<Visualization>, StorageError> {
        let mut found: Vec<Visualization> = self
            .visualizations
            .read()
            .await
            .values()
            .filter(|v| v.query_id == query_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    async fn visualization_by_shareable_id(
        &self,
        shareable_id: &str,
    ) -> Result<Option<Visualization>, StorageError> {
        Ok(self
            .visualizations
            .read()
            .await
            .values()
            .find(|v| v.shareable_id == shareable_id)
            .cloned())
    }

    async fn delete_visualization(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self.visualizations.write().await.remove(id).is_some())
    }
}
