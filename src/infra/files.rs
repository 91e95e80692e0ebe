//! Filesystem-backed producers served through the caching pipeline.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::fs;

use crate::cache::{SourceMarker, Validity};
use crate::pipeline::{
    ByteSink, Event, EventProducer, EventSink, Pipeline, PipelineError, Producer, XmlSerializer,
};

/// Directory tree requests are resolved against.
#[derive(Debug, Clone)]
pub struct ContentRoot {
    root: PathBuf,
}

impl ContentRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a request path onto the content root, rejecting traversal.
    pub fn resolve(&self, request_path: &str) -> Result<PathBuf, PipelineError> {
        let relative = Path::new(request_path.trim_start_matches('/'));
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir))
        {
            return Err(PipelineError::not_found(request_path));
        }

        Ok(self.root.join(relative))
    }

    /// Build the pipeline that serves `request_path`.
    ///
    /// Files are served as bytes. Directories become a listing document
    /// rendered as XML.
    pub async fn pipeline_for(&self, request_path: &str) -> Result<Pipeline, PipelineError> {
        let path = self.resolve(request_path)?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|_| PipelineError::not_found(request_path))?;

        if metadata.is_dir() {
            Ok(Pipeline::events(
                DirectoryProducer::new(path, request_path),
                XmlSerializer::new(),
            ))
        } else {
            Ok(Pipeline::serialized(FileProducer::new(path)))
        }
    }
}

/// Streams a file verbatim.
#[derive(Debug)]
pub struct FileProducer {
    path: PathBuf,
}

impl FileProducer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Producer for FileProducer {
    async fn produce(&mut self, out: &mut dyn ByteSink) -> Result<(), PipelineError> {
        let data = fs::read(&self.path).await.map_err(|err| {
            PipelineError::generation(format!("failed to read {}: {err}", self.path.display()))
        })?;
        out.write(&data)?;
        Ok(())
    }

    fn content_type(&self) -> Option<String> {
        mime_guess::from_path(&self.path)
            .first()
            .map(|mime| mime.essence_str().to_string())
    }

    async fn validities(&self) -> Result<Vec<Validity>, PipelineError> {
        Ok(vec![modified_validity(&self.path).await?])
    }
}

/// Emits a `<directory>` document listing the entries of a directory.
#[derive(Debug)]
pub struct DirectoryProducer {
    path: PathBuf,
    request_path: String,
}

impl DirectoryProducer {
    pub fn new(path: impl Into<PathBuf>, request_path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            request_path: request_path.into(),
        }
    }

    async fn entries(&self) -> Result<Vec<(String, bool)>, PipelineError> {
        let listing_failed = |err: std::io::Error| {
            PipelineError::generation(format!("failed to list {}: {err}", self.path.display()))
        };
        let mut reader = fs::read_dir(&self.path).await.map_err(listing_failed)?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(listing_failed)? {
            let is_dir = entry.file_type().await.map_err(listing_failed)?.is_dir();
            entries.push((entry.file_name().to_string_lossy().into_owned(), is_dir));
        }
        entries.sort();
        Ok(entries)
    }
}

#[async_trait]
impl EventProducer for DirectoryProducer {
    async fn produce(&mut self, out: &mut dyn EventSink) -> Result<(), PipelineError> {
        let entries = self.entries().await?;

        out.event(&Event::StartDocument)?;
        out.event(&Event::start_with(
            "directory",
            vec![("path".to_string(), self.request_path.clone())],
        ))?;
        for (name, is_dir) in entries {
            let element = if is_dir { "directory" } else { "file" };
            out.event(&Event::start_with(element, vec![("name".to_string(), name)]))?;
            out.event(&Event::end(element))?;
        }
        out.event(&Event::end("directory"))?;
        out.event(&Event::EndDocument)
    }

    async fn validities(&self) -> Result<Vec<Validity>, PipelineError> {
        Ok(vec![modified_validity(&self.path).await?])
    }
}

async fn modified_validity(path: &Path) -> Result<Validity, PipelineError> {
    let modified = fs::metadata(path)
        .await
        .and_then(|metadata| metadata.modified())
        .map_err(|err| {
            PipelineError::generation(format!("failed to stat {}: {err}", path.display()))
        })?;
    Ok(Validity::source(
        path.to_string_lossy(),
        SourceMarker::Modified(OffsetDateTime::from(modified)),
    ))
}
