use crate::config::{Settings, LOCAL_EMBEDDING_MODEL};
use crate::error::{ConfigError, SearchError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;

/// Inputs sent per `/embeddings` request.
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 1000;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError>;

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, SearchError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Picks the embedder named by `settings.embedding_model`.
pub fn build_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>, ConfigError> {
    if settings.uses_local_embeddings() {
        return Ok(Arc::new(CharacterNgramEmbedder::default()));
    }

    let embedder = OpenAiEmbedder::new(
        settings.api_key()?,
        &settings.openai_base_url,
        &settings.embedding_model,
    );
    Ok(Arc::new(embedder))
}

/// Offline hashed trigram embedder. Vectors are L2-normalised.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn model_name(&self) -> &str {
        LOCAL_EMBEDDING_MODEL
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        Ok(self.embed_text(text))
    }
}

pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    batch_size: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(api_key: &str, base_url: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
        }
    }

    /// Caps the number of inputs per request. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    async fn request_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, SearchError> {
        debug!(model = %self.model, batch_size = texts.len(), "embedding batch");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, "embedding request rejected");
            return Err(Self::failure(format!("API returned {status}: {body}")));
        }

        let mut payload: EmbeddingResponse = response.json().await?;
        if payload.data.len() != texts.len() {
            return Err(Self::failure(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                payload.data.len()
            )));
        }

        payload.data.sort_by_key(|item| item.index);
        Ok(payload.data.into_iter().map(|item| item.embedding).collect())
    }

    fn failure(message: impl Into<String>) -> SearchError {
        SearchError::Embedding {
            provider: "openai".to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Self::failure("API returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, SearchError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.request_batch(batch).await?);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Answers one `/embeddings` request per connection. Each vector is
    /// `[text length]`, returned in reverse index order.
    async fn serve_embeddings(listener: TcpListener, batches: Arc<Mutex<Vec<usize>>>) {
        while let Ok((socket, _)) = listener.accept().await {
            if answer_embedding_request(socket, &batches).await.is_err() {
                break;
            }
        }
    }

    async fn answer_embedding_request(
        mut socket: TcpStream,
        batches: &Mutex<Vec<usize>>,
    ) -> std::io::Result<()> {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];
        let body_start = loop {
            let read = socket.read(&mut chunk).await?;
            if read == 0 {
                return Ok(());
            }
            buffer.extend_from_slice(&chunk[..read]);
            if let Some(end) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
                break end + 4;
            }
        };

        let head = String::from_utf8_lossy(&buffer[..body_start]).to_lowercase();
        let length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buffer.len() < body_start + length {
            let read = socket.read(&mut chunk).await?;
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..read]);
        }

        let request: Value = serde_json::from_slice(&buffer[body_start..body_start + length])?;
        let inputs: Vec<String> = request["input"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        batches.lock().unwrap().push(inputs.len());

        let data: Vec<Value> = inputs
            .iter()
            .enumerate()
            .rev()
            .map(|(index, text)| json!({ "index": index, "embedding": [text.len() as f32] }))
            .collect();
        let body = json!({ "data": data }).to_string();
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await?;
        socket.shutdown().await
    }

    #[tokio::test]
    async fn remote_batches_are_split_and_kept_in_order() -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;
        let batches = Arc::new(Mutex::new(Vec::new()));
        tokio::spawn(serve_embeddings(listener, Arc::clone(&batches)));

        let embedder = OpenAiEmbedder::new("sk-test", &format!("http://{address}/v1"), "embed-small")
            .with_client(Client::builder().no_proxy().build()?)
            .with_batch_size(2);
        let vectors = embedder
            .embed_batch(&["a", "bb", "ccc", "dddd", "eeeee"])
            .await?;

        assert_eq!(
            vectors,
            vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0], vec![5.0]]
        );
        assert_eq!(*batches.lock().unwrap(), vec![2, 2, 1]);
        Ok(())
    }

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed_text("Hydraulic pressure and flow");
        let second = embedder.embed_text("Hydraulic pressure and flow");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed_text("abc");
        assert_eq!(vector.len(), 32);
    }

    #[tokio::test]
    async fn default_batch_embeds_each_text() -> Result<(), SearchError> {
        let embedder = CharacterNgramEmbedder::default();
        let vectors = embedder.embed_batch(&["one", "two", "three"]).await?;
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[1], embedder.embed_text("two"));
        Ok(())
    }

    #[test]
    fn remote_embedder_requires_api_key() {
        let settings = Settings::default();
        assert!(matches!(
            build_embedder(&settings),
            Err(ConfigError::MissingApiKey)
        ));
    }

    #[test]
    fn local_model_needs_no_key() -> Result<(), ConfigError> {
        let settings = Settings {
            embedding_model: LOCAL_EMBEDDING_MODEL.to_string(),
            ..Settings::default()
        };
        let embedder = build_embedder(&settings)?;
        assert_eq!(embedder.model_name(), LOCAL_EMBEDDING_MODEL);
        Ok(())
    }
}
