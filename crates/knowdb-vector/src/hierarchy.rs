//! Category and topic rows. Names are compared trimmed and case-insensitively.

use std::sync::Arc;

use arrow_array::{Int64Array, RecordBatch, StringArray};

use knowdb_core::types::{Category, Topic};
use knowdb_core::{Error, Result};

use crate::schema::{categories_schema, topics_schema, CATEGORIES, TOPICS};
use crate::storage::Storage;
use crate::table::{now_millis, quote, reader, scan, str_col};

#[derive(Clone)]
pub struct HierarchyStore {
    storage: Storage,
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn clean_name(kind: &str, name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(format!("{} name must not be empty", kind)));
    }
    Ok(trimmed.to_string())
}

impl HierarchyStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub async fn create_category(&self, name: &str, description: &str) -> Result<Category> {
        let name = clean_name("category", name)?;
        if self.find_category_by_name(&name).await?.is_some() {
            return Err(Error::DuplicateName(format!("category '{}' already exists", name)));
        }
        let category = Category { id: uuid::Uuid::new_v4().to_string(), name, description: description.to_string() };
        let batch = RecordBatch::try_new(
            categories_schema(),
            vec![
                Arc::new(StringArray::from(vec![category.id.as_str()])),
                Arc::new(StringArray::from(vec![category.name.as_str()])),
                Arc::new(StringArray::from(vec![category.description.as_str()])),
                Arc::new(Int64Array::from(vec![now_millis()])),
            ],
        )
        .map_err(Error::operation)?;
        let table = self.storage.table(CATEGORIES).await?;
        table.add(reader(batch)).execute().await.map_err(Error::operation)?;
        tracing::info!(category_id = %category.id, name = %category.name, "created category");
        Ok(category)
    }

    pub async fn get_category(&self, id: &str) -> Result<Category> {
        self.select_categories(Some(format!("id = {}", quote(id))))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("category {}", id)))
    }

    pub async fn find_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        let wanted = normalize(name);
        Ok(self.list_categories().await?.into_iter().find(|c| normalize(&c.name) == wanted))
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        let mut out = self.select_categories(None).await?;
        out.sort_by_key(|c| normalize(&c.name));
        Ok(out)
    }

    pub async fn rename_category(&self, id: &str, new_name: &str) -> Result<Category> {
        let mut category = self.get_category(id).await?;
        let name = clean_name("category", new_name)?;
        if let Some(other) = self.find_category_by_name(&name).await? {
            if other.id != category.id {
                return Err(Error::DuplicateName(format!("category '{}' already exists", name)));
            }
        }
        let table = self.storage.table(CATEGORIES).await?;
        table
            .update()
            .only_if(format!("id = {}", quote(id)))
            .column("name", quote(&name))
            .execute()
            .await
            .map_err(Error::operation)?;
        category.name = name;
        Ok(category)
    }

    pub async fn delete_category_row(&self, id: &str) -> Result<()> {
        let table = self.storage.table(CATEGORIES).await?;
        table.delete(&format!("id = {}", quote(id))).await.map_err(Error::operation)?;
        Ok(())
    }

    pub async fn create_topic(&self, category_id: &str, name: &str, description: &str) -> Result<Topic> {
        self.get_category(category_id).await?;
        let name = clean_name("topic", name)?;
        if self.find_topic_by_name(category_id, &name).await?.is_some() {
            return Err(Error::DuplicateName(format!("topic '{}' already exists in this category", name)));
        }
        let topic = Topic {
            id: uuid::Uuid::new_v4().to_string(),
            category_id: category_id.to_string(),
            name,
            description: description.to_string(),
        };
        let batch = RecordBatch::try_new(
            topics_schema(),
            vec![
                Arc::new(StringArray::from(vec![topic.id.as_str()])),
                Arc::new(StringArray::from(vec![topic.category_id.as_str()])),
                Arc::new(StringArray::from(vec![topic.name.as_str()])),
                Arc::new(StringArray::from(vec![topic.description.as_str()])),
                Arc::new(Int64Array::from(vec![now_millis()])),
            ],
        )
        .map_err(Error::operation)?;
        let table = self.storage.table(TOPICS).await?;
        table.add(reader(batch)).execute().await.map_err(Error::operation)?;
        tracing::info!(topic_id = %topic.id, category_id, name = %topic.name, "created topic");
        Ok(topic)
    }

    pub async fn get_topic(&self, id: &str) -> Result<Topic> {
        self.select_topics(Some(format!("id = {}", quote(id))))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("topic {}", id)))
    }

    pub async fn find_topic_by_name(&self, category_id: &str, name: &str) -> Result<Option<Topic>> {
        let wanted = normalize(name);
        Ok(self
            .list_topics(Some(category_id))
            .await?
            .into_iter()
            .find(|t| normalize(&t.name) == wanted))
    }

    pub async fn list_topics(&self, category_id: Option<&str>) -> Result<Vec<Topic>> {
        let filter = category_id.map(|c| format!("category_id = {}", quote(c)));
        let mut out = self.select_topics(filter).await?;
        out.sort_by_key(|t| normalize(&t.name));
        Ok(out)
    }

    pub async fn rename_topic(&self, id: &str, new_name: &str) -> Result<Topic> {
        let mut topic = self.get_topic(id).await?;
        let name = clean_name("topic", new_name)?;
        if let Some(other) = self.find_topic_by_name(&topic.category_id, &name).await? {
            if other.id != topic.id {
                return Err(Error::DuplicateName(format!("topic '{}' already exists in this category", name)));
            }
        }
        let table = self.storage.table(TOPICS).await?;
        table
            .update()
            .only_if(format!("id = {}", quote(id)))
            .column("name", quote(&name))
            .execute()
            .await
            .map_err(Error::operation)?;
        topic.name = name;
        Ok(topic)
    }

    pub async fn delete_topic_row(&self, id: &str) -> Result<()> {
        let table = self.storage.table(TOPICS).await?;
        table.delete(&format!("id = {}", quote(id))).await.map_err(Error::operation)?;
        Ok(())
    }

    pub async fn count_categories(&self) -> Result<usize> {
        let table = self.storage.table(CATEGORIES).await?;
        table.count_rows(None).await.map_err(Error::unavailable)
    }

    pub async fn count_topics(&self) -> Result<usize> {
        let table = self.storage.table(TOPICS).await?;
        table.count_rows(None).await.map_err(Error::unavailable)
    }

    pub async fn clear(&self) -> Result<()> {
        self.storage.truncate(TOPICS).await?;
        self.storage.truncate(CATEGORIES).await
    }

    async fn select_categories(&self, filter: Option<String>) -> Result<Vec<Category>> {
        let table = self.storage.table(CATEGORIES).await?;
        let mut out = Vec::new();
        for batch in scan(&table, filter.as_deref()).await? {
            let ids = str_col(&batch, "id")?;
            let names = str_col(&batch, "name")?;
            let descriptions = str_col(&batch, "description")?;
            for i in 0..batch.num_rows() {
                out.push(Category {
                    id: ids.value(i).to_string(),
                    name: names.value(i).to_string(),
                    description: descriptions.value(i).to_string(),
                });
            }
        }
        Ok(out)
    }

    async fn select_topics(&self, filter: Option<String>) -> Result<Vec<Topic>> {
        let table = self.storage.table(TOPICS).await?;
        let mut out = Vec::new();
        for batch in scan(&table, filter.as_deref()).await? {
            let ids = str_col(&batch, "id")?;
            let categories = str_col(&batch, "category_id")?;
            let names = str_col(&batch, "name")?;
            let descriptions = str_col(&batch, "description")?;
            for i in 0..batch.num_rows() {
                out.push(Topic {
                    id: ids.value(i).to_string(),
                    category_id: categories.value(i).to_string(),
                    name: names.value(i).to_string(),
                    description: descriptions.value(i).to_string(),
                });
            }
        }
        Ok(out)
    }
}
