//! Shared harness: in-memory bucket, fake signer, scripted captioner.

#![allow(dead_code)]

use std::fmt;
use std::path::Path as FsPath;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{body::Body, http::Request, Router};
use bytes::Bytes;
use gcs_image_captioner::{
    captioner::{Caption, Captioner},
    config::Config,
    create_router,
    storage::ObjectStoreGateway,
    AppState,
};
use futures::stream::BoxStream;
use http_body_util::BodyExt;
use object_store::{
    memory::InMemory, path::Path, signer::Signer, GetOptions, GetResult, ListResult,
    MultipartUpload, ObjectMeta, ObjectStore, PutMultipartOpts, PutOptions, PutPayload,
    PutResult,
};
use tempfile::TempDir;
use url::Url;

pub const BOUNDARY: &str = "X-CAPTIONER-BOUNDARY";

#[derive(Debug)]
pub struct FakeSigner;

#[async_trait]
impl Signer for FakeSigner {
    async fn signed_url(
        &self,
        method: http::Method,
        path: &Path,
        expires_in: Duration,
    ) -> object_store::Result<Url> {
        Ok(Url::parse(&format!(
            "https://storage.example/test-bucket/{}?X-Goog-Expires={}&method={}",
            path,
            expires_in.as_secs(),
            method
        ))
        .unwrap())
    }
}

/// Returns a fixed caption and counts calls.
pub struct ScriptedCaptioner {
    pub caption: Caption,
    pub calls: AtomicUsize,
}

#[async_trait]
impl Captioner for ScriptedCaptioner {
    async fn caption(&self, image_path: &FsPath) -> Caption {
        assert!(image_path.exists());
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.caption.clone()
    }
}

/// Delegates reads to an [`InMemory`] store and refuses every write.
#[derive(Debug)]
pub struct ReadOnlyStore {
    inner: Arc<InMemory>,
}

impl fmt::Display for ReadOnlyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReadOnlyStore({})", self.inner)
    }
}

fn refuse(location: &Path) -> object_store::Error {
    object_store::Error::Generic {
        store: "ReadOnlyStore",
        source: format!("refusing to write {location}").into(),
    }
}

#[async_trait]
impl ObjectStore for ReadOnlyStore {
    async fn put_opts(
        &self,
        location: &Path,
        _payload: PutPayload,
        _opts: PutOptions,
    ) -> object_store::Result<PutResult> {
        Err(refuse(location))
    }

    async fn put_multipart_opts(
        &self,
        location: &Path,
        _opts: PutMultipartOpts,
    ) -> object_store::Result<Box<dyn MultipartUpload>> {
        Err(refuse(location))
    }

    async fn get_opts(
        &self,
        location: &Path,
        options: GetOptions,
    ) -> object_store::Result<GetResult> {
        self.inner.get_opts(location, options).await
    }

    async fn delete(&self, location: &Path) -> object_store::Result<()> {
        self.inner.delete(location).await
    }

    fn list(&self, prefix: Option<&Path>) -> BoxStream<'static, object_store::Result<ObjectMeta>> {
        self.inner.list(prefix)
    }

    async fn list_with_delimiter(&self, prefix: Option<&Path>) -> object_store::Result<ListResult> {
        self.inner.list_with_delimiter(prefix).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> object_store::Result<()> {
        self.inner.copy(from, to).await
    }

    async fn copy_if_not_exists(&self, from: &Path, to: &Path) -> object_store::Result<()> {
        self.inner.copy_if_not_exists(from, to).await
    }
}

pub struct Harness {
    pub store: Arc<InMemory>,
    pub captioner: Arc<ScriptedCaptioner>,
    pub scratch: TempDir,
    pub app: Router,
}

impl Harness {
    pub fn new(caption: Caption) -> Self {
        Self::build(caption, Some("test-bucket"), false)
    }

    pub fn without_bucket() -> Self {
        Self::build(Caption::Failed, None, false)
    }

    /// Bucket that accepts reads but fails every upload.
    pub fn read_only(caption: Caption) -> Self {
        Self::build(caption, Some("test-bucket"), true)
    }

    fn build(caption: Caption, bucket: Option<&str>, read_only: bool) -> Self {
        let store = Arc::new(InMemory::new());
        let captioner = Arc::new(ScriptedCaptioner {
            caption,
            calls: AtomicUsize::new(0),
        });
        let scratch = tempfile::tempdir().unwrap();
        let config = Config {
            bucket_name: bucket.map(str::to_string),
            bg_color: "#abcdef".to_string(),
            scratch_dir: scratch.path().to_path_buf(),
            ..Config::default()
        };
        let backend: Arc<dyn ObjectStore> = if read_only {
            Arc::new(ReadOnlyStore {
                inner: store.clone(),
            })
        } else {
            store.clone()
        };
        let storage =
            bucket.map(|b| ObjectStoreGateway::new(b, backend.clone(), Arc::new(FakeSigner)));
        let app = create_router(AppState {
            config: Arc::new(config),
            storage,
            captioner: captioner.clone(),
        });
        Self {
            store,
            captioner,
            scratch,
            app,
        }
    }

    /// Number of per-request scratch directories still on disk.
    pub fn scratch_entries(&self) -> usize {
        std::fs::read_dir(self.scratch.path()).unwrap().count()
    }

    pub async fn object(&self, key: &str) -> Option<Bytes> {
        match self.store.get(&Path::from(key)).await {
            Ok(result) => Some(result.bytes().await.unwrap()),
            Err(object_store::Error::NotFound { .. }) => None,
            Err(e) => panic!("unexpected store error: {e}"),
        }
    }

    pub async fn put(&self, key: &str, data: &[u8]) {
        self.store
            .put(&Path::from(key), Bytes::copy_from_slice(data).into())
            .await
            .unwrap();
    }

    pub async fn object_count(&self) -> usize {
        use futures::TryStreamExt;
        self.store
            .list(None)
            .try_collect::<Vec<_>>()
            .await
            .unwrap()
            .len()
    }

    pub fn caption_calls(&self) -> usize {
        self.captioner.calls.load(Ordering::SeqCst)
    }
}

/// One multipart part: `(field name, optional filename, contents)`.
pub fn multipart_request(parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, filename, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(filename) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: image/jpeg\r\n\r\n"
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
            }
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
