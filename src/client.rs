//! Typed HTTP clients for the controller and file server RPC surfaces.

use anyhow::{anyhow, Context};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::de::DeserializeOwned;

use crate::membership::FileServerEntry;
use crate::protocol::{
    AddFileReply, AddFileRequest, DirEntry, FindFileReply, PathRequest, RemoveFileReply,
    WriteFileRequest,
};
use crate::registry::FileRecord;

fn endpoint(base_url: &str, path: &str) -> String {
    let base = if base_url.contains("://") {
        base_url.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", base_url.trim_end_matches('/'))
    };
    format!("{}/{}", base, path.trim_start_matches('/'))
}

/// Decode a JSON reply, turning non-2xx responses into errors that carry
/// the server's `{code, message}` body.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> anyhow::Result<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .context("failed to decode reply");
    }
    let body = response.text().await.unwrap_or_default();
    Err(anyhow!("request failed (status {}): {}", status, body))
}

/// Client for the controller.
#[derive(Clone, Debug)]
pub struct ControllerClient {
    client: reqwest::Client,
    base_url: String,
}

impl ControllerClient {
    /// `base_url` is either `host:port` or a full `http://` URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn file_url(&self, name: &str) -> String {
        let encoded = utf8_percent_encode(name, NON_ALPHANUMERIC).to_string();
        endpoint(&self.base_url, &format!("files/{encoded}"))
    }

    pub async fn get_file_servers(&self) -> anyhow::Result<Vec<FileServerEntry>> {
        let url = endpoint(&self.base_url, "fileservers");
        decode(self.client.get(url).send().await?).await
    }

    pub async fn add_file(&self, name: &str, size: i64) -> anyhow::Result<AddFileReply> {
        let url = endpoint(&self.base_url, "files");
        let request = AddFileRequest {
            name: name.to_string(),
            size,
        };
        decode(self.client.post(url).json(&request).send().await?).await
    }

    pub async fn find_file(&self, name: &str) -> anyhow::Result<FindFileReply> {
        decode(self.client.get(self.file_url(name)).send().await?).await
    }

    pub async fn remove_file(&self, name: &str) -> anyhow::Result<RemoveFileReply> {
        decode(self.client.delete(self.file_url(name)).send().await?).await
    }

    pub async fn list_files(&self) -> anyhow::Result<Vec<FileRecord>> {
        let url = endpoint(&self.base_url, "files");
        decode(self.client.get(url).send().await?).await
    }
}

/// Client for one file server.
#[derive(Clone, Debug)]
pub struct FileServerClient {
    client: reqwest::Client,
    base_url: String,
}

impl FileServerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> anyhow::Result<T>
    where
        B: serde::Serialize,
        T: DeserializeOwned,
    {
        let url = endpoint(&self.base_url, path);
        decode(self.client.post(url).json(body).send().await?).await
    }

    pub async fn make_directory(&self, path: &str, mode: u32) -> anyhow::Result<bool> {
        let req = PathRequest {
            path: path.to_string(),
            mode,
        };
        self.post("dir/make", &req).await
    }

    pub async fn remove_directory(&self, path: &str) -> anyhow::Result<bool> {
        let req = PathRequest {
            path: path.to_string(),
            mode: 0,
        };
        self.post("dir/remove", &req).await
    }

    pub async fn write_file(&self, path: &str, data: &[u8], mode: u32) -> anyhow::Result<bool> {
        let req = WriteFileRequest {
            path: path.to_string(),
            data: data.to_vec(),
            mode,
        };
        self.post("file/write", &req).await
    }

    pub async fn remove_file(&self, path: &str) -> anyhow::Result<bool> {
        let req = PathRequest {
            path: path.to_string(),
            mode: 0,
        };
        self.post("file/remove", &req).await
    }

    pub async fn list_dir(&self, path: &str) -> anyhow::Result<Vec<DirEntry>> {
        let req = PathRequest {
            path: path.to_string(),
            mode: 0,
        };
        self.post("dir/list", &req).await
    }
}
