//! Qdrant adapter for the vector store port.

use crate::{IndexPoint, PointPayload, Result, SearchHit, StoreError, VectorStore};
use async_trait::async_trait;
use qdrant_client::Payload;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::vectors_config::Config as VectorsKind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance,
    Filter, GetCollectionInfoResponse, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
    Value, VectorParamsBuilder,
};
use std::collections::HashMap;
use uuid::Uuid;

const DEFAULT_COLLECTION: &str = "hazel_chunks";

/// Vector store backed by a Qdrant collection with cosine distance.
///
/// Qdrant point ids must be UUIDs or integers, so the port's string id
/// (`hash(file_path) + "_" + sequence`) is mapped to a UUID derived from
/// its blake3 hash. The mapping is deterministic, which preserves the
/// overwrite-in-place upsert semantics; the original string id rides along
/// in the payload.
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
}

impl std::fmt::Debug for QdrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantStore")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl QdrantStore {
    /// Connect to the Qdrant server at `url` using the default collection
    /// name.
    pub fn new(url: &str) -> Result<Self> {
        Self::with_collection(url, DEFAULT_COLLECTION)
    }

    /// Connect using an explicit collection name.
    pub fn with_collection(url: &str, collection: &str) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            collection: collection.to_string(),
        })
    }
}

/// Deterministic UUID for a logical point id.
fn point_uuid(id: &str) -> Uuid {
    let hash = blake3::hash(id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash.as_bytes()[..16]);
    Uuid::from_bytes(bytes)
}

fn build_payload(point: &IndexPoint) -> HashMap<String, Value> {
    let p = &point.payload;
    let mut payload = HashMap::new();
    payload.insert("point_id".to_string(), Value::from(point.id.clone()));
    payload.insert("file_path".to_string(), Value::from(p.file_path.clone()));
    payload.insert("sequence".to_string(), Value::from(p.sequence as i64));
    payload.insert("char_start".to_string(), Value::from(p.char_start as i64));
    payload.insert("char_end".to_string(), Value::from(p.char_end as i64));
    payload.insert("line_start".to_string(), Value::from(p.line_start as i64));
    payload.insert("line_end".to_string(), Value::from(p.line_end as i64));
    if let Some(text) = &p.text {
        payload.insert("text".to_string(), Value::from(text.clone()));
    }
    payload
}

fn read_payload(map: &HashMap<String, Value>) -> Option<(String, PointPayload)> {
    let get_usize = |key: &str| {
        map.get(key)
            .and_then(Value::as_integer)
            .and_then(|v| usize::try_from(v).ok())
    };

    let id = map.get("point_id")?.as_str()?.to_string();
    let payload = PointPayload {
        file_path: map.get("file_path")?.as_str()?.to_string(),
        sequence: get_usize("sequence")?,
        char_start: get_usize("char_start")?,
        char_end: get_usize("char_end")?,
        line_start: get_usize("line_start")?,
        line_end: get_usize("line_end")?,
        text: map.get("text").and_then(Value::as_str).map(|s| s.to_string()),
    };
    Some((id, payload))
}

fn configured_dimension(info: &GetCollectionInfoResponse) -> Option<u64> {
    let config = info
        .result
        .as_ref()?
        .config
        .as_ref()?
        .params
        .as_ref()?
        .vectors_config
        .as_ref()?
        .config
        .as_ref()?;
    match config {
        VectorsKind::Params(params) => Some(params.size),
        VectorsKind::ParamsMap(_) => None,
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, dimension: usize) -> Result<()> {
        let dim = dimension as u64;

        if self.client.collection_exists(&self.collection).await? {
            let info = self.client.collection_info(&self.collection).await?;
            match configured_dimension(&info) {
                Some(existing) if existing == dim => return Ok(()),
                existing => {
                    tracing::warn!(
                        collection = %self.collection,
                        ?existing,
                        requested = dim,
                        "collection dimension changed, recreating empty"
                    );
                    self.client.delete_collection(&self.collection).await?;
                }
            }
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dim, Distance::Cosine)),
            )
            .await?;
        Ok(())
    }

    async fn upsert(&self, points: Vec<IndexPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let qdrant_points: Vec<PointStruct> = points
            .iter()
            .map(|point| {
                PointStruct::new(
                    point_uuid(&point.id).to_string(),
                    point.vector.clone(),
                    Payload::from(build_payload(point)),
                )
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, qdrant_points))
            .await?;
        Ok(())
    }

    async fn delete_for_file(&self, file_path: &str) -> Result<()> {
        if !self.client.collection_exists(&self.collection).await? {
            return Ok(());
        }

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(Filter::must([Condition::matches(
                        "file_path",
                        file_path.to_string(),
                    )]))
                    .wait(true),
            )
            .await?;
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        if !self.client.collection_exists(&self.collection).await? {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector.to_vec(), limit as u64)
                    .with_payload(true),
            )
            .await?;

        let hits = response
            .result
            .into_iter()
            .filter_map(|scored| match read_payload(&scored.payload) {
                Some((id, payload)) => Some(SearchHit {
                    id,
                    score: scored.score,
                    payload,
                }),
                None => {
                    tracing::warn!(?scored.id, "skipping point with malformed payload");
                    None
                }
            })
            .collect();
        Ok(hits)
    }

    async fn point_count(&self) -> Result<usize> {
        if !self.client.collection_exists(&self.collection).await? {
            return Ok(0);
        }

        let response = self
            .client
            .count(CountPointsBuilder::new(&self.collection).exact(true))
            .await?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_uuid_is_deterministic() {
        let a = point_uuid("abc123_0");
        let b = point_uuid("abc123_0");
        let c = point_uuid("abc123_1");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn payload_round_trips() {
        let point = IndexPoint {
            id: "deadbeef_3".to_string(),
            vector: vec![0.1, 0.2],
            payload: PointPayload {
                file_path: "src/lib.rs".to_string(),
                sequence: 3,
                char_start: 100,
                char_end: 220,
                line_start: 11,
                line_end: 20,
                text: Some("fn main() {}".to_string()),
            },
        };

        let payload = build_payload(&point);
        let (id, read) = read_payload(&payload).unwrap();

        assert_eq!(id, point.id);
        assert_eq!(read, point.payload);
    }

    #[test]
    fn payload_without_text_round_trips() {
        let point = IndexPoint {
            id: "feed_0".to_string(),
            vector: vec![0.5],
            payload: PointPayload {
                file_path: "notes.md".to_string(),
                sequence: 0,
                char_start: 0,
                char_end: 5,
                line_start: 1,
                line_end: 1,
                text: None,
            },
        };

        let payload = build_payload(&point);
        let (_, read) = read_payload(&payload).unwrap();
        assert_eq!(read.text, None);
    }

    #[tokio::test]
    #[ignore] // Needs a running Qdrant; run with -- --ignored.
    async fn live_upsert_and_search() -> Result<()> {
        let store = QdrantStore::with_collection("http://localhost:6334", "hazel_test")?;
        store.ensure_collection(2).await?;
        store
            .upsert(vec![IndexPoint {
                id: "live_0".to_string(),
                vector: vec![1.0, 0.0],
                payload: PointPayload {
                    file_path: "live.txt".to_string(),
                    sequence: 0,
                    char_start: 0,
                    char_end: 4,
                    line_start: 1,
                    line_end: 1,
                    text: Some("live".to_string()),
                },
            }])
            .await?;

        let hits = store.search(&[1.0, 0.0], 1).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].payload.file_path, "live.txt");

        store.delete_for_file("live.txt").await?;
        assert_eq!(store.point_count().await?, 0);
        Ok(())
    }
}
