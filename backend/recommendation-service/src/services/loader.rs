//! Builds training sets from a [`DataStore`] by walking its cursors.

use crate::click::{ClickDataSet, ClickDataSetBuilder};
use crate::error::Result;
use crate::models::{Feedback, Item, User};
use crate::ranking::{DataSet, DataSetBuilder};
use crate::storage::DataStore;
use std::collections::{BTreeMap, HashMap};
use tracing::info;

/// Page size for cursor walks.
pub const BATCH_SIZE: usize = 1024;

pub async fn load_users(data: &dyn DataStore) -> Result<Vec<User>> {
    let mut users = Vec::new();
    let mut cursor = String::new();
    loop {
        let (next, batch) = data.get_users(&cursor, BATCH_SIZE).await?;
        users.extend(batch);
        if next.is_empty() {
            return Ok(users);
        }
        cursor = next;
    }
}

pub async fn load_items(data: &dyn DataStore) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    let mut cursor = String::new();
    loop {
        let (next, batch) = data.get_items(&cursor, BATCH_SIZE).await?;
        items.extend(batch);
        if next.is_empty() {
            return Ok(items);
        }
        cursor = next;
    }
}

/// Every feedback record of the given types; empty types load all.
pub async fn load_feedback(data: &dyn DataStore, feedback_types: &[String]) -> Result<Vec<Feedback>> {
    let mut feedback = Vec::new();
    let mut cursor = String::new();
    loop {
        let (next, batch) = data.get_feedback(&cursor, BATCH_SIZE, feedback_types).await?;
        feedback.extend(batch);
        if next.is_empty() {
            return Ok(feedback);
        }
        cursor = next;
    }
}

/// Implicit-feedback set over all users and items, with pairs taken from
/// feedback of `feedback_types`.
pub async fn load_ranking_dataset(data: &dyn DataStore, feedback_types: &[String]) -> Result<DataSet> {
    let mut builder = DataSetBuilder::new();
    for user in load_users(data).await? {
        builder.add_user(&user.user_id)?;
    }
    for item in load_items(data).await? {
        builder.add_item(&item.item_id)?;
    }
    let feedback = load_feedback(data, feedback_types).await?;
    for record in &feedback {
        builder.add_feedback(record.user_id(), record.item_id())?;
    }
    let dataset = builder.build();
    info!(
        n_users = dataset.user_count(),
        n_items = dataset.item_count(),
        n_feedback = dataset.count(),
        "loaded ranking dataset"
    );
    Ok(dataset)
}

/// Labelled samples: `+1` for feedback of `positive_types`, `-1` for any
/// other feedback on a pair with no positive record.
pub async fn load_click_dataset(data: &dyn DataStore, positive_types: &[String]) -> Result<ClickDataSet> {
    let labels: HashMap<String, Vec<String>> = load_items(data)
        .await?
        .into_iter()
        .map(|item| (item.item_id, item.labels))
        .collect();

    let mut targets: BTreeMap<(String, String), f32> = BTreeMap::new();
    for record in load_feedback(data, &[]).await? {
        let positive = positive_types.is_empty()
            || positive_types.iter().any(|t| t == record.feedback_type());
        let target = if positive { 1.0 } else { -1.0 };
        let entry = targets
            .entry((record.key.user_id, record.key.item_id))
            .or_insert(target);
        *entry = entry.max(target);
    }

    let mut builder = ClickDataSetBuilder::new();
    for ((user_id, item_id), target) in &targets {
        let item_labels = labels.get(item_id).map(Vec::as_slice).unwrap_or(&[]);
        builder.add_sample(user_id, item_id, item_labels, *target);
    }
    let dataset = builder.build();
    info!(
        n_samples = dataset.count(),
        n_features = dataset.index().len(),
        "loaded click dataset"
    );
    Ok(dataset)
}
