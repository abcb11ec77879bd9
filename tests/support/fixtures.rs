//! Shared builders for the integration tests: converter registries without
//! network collaborators, job runners over temp storage, and ZIP readers.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mdpack_core::convert::{
    ConvertError, Converted, Converter, ConverterInput, ConverterKind, ConverterRegistry,
    HtmlConverter, OfficeConverter, TextConverter,
};
use mdpack_core::job::SizeLimits;
use mdpack_core::{
    BatchCoordinator, ConversionService, JobId, JobManager, JobRunner, JobSnapshot, ResultStore,
};

/// Fails every item by panicking.
pub struct Panicking;

#[async_trait]
impl Converter for Panicking {
    async fn convert(
        &self,
        _kind: ConverterKind,
        input: ConverterInput<'_>,
    ) -> Result<Converted, ConvertError> {
        panic!("converter exploded on {}", input.name);
    }
}

/// Sleeps for the number of milliseconds the text body holds, then echoes it.
pub struct Sleepy;

#[async_trait]
impl Converter for Sleepy {
    async fn convert(
        &self,
        kind: ConverterKind,
        input: ConverterInput<'_>,
    ) -> Result<Converted, ConvertError> {
        let text = input.text(kind)?;
        let delay: u64 = text.trim().parse().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(Converted::markdown(format!("slept {delay} ms")))
    }
}

/// Text, Markdown, HTML and DOCX converters; nothing that touches the network.
pub fn offline_registry() -> ConverterRegistry {
    let mut registry = ConverterRegistry::new();
    registry.register(ConverterKind::Txt, Arc::new(TextConverter));
    registry.register(ConverterKind::Md, Arc::new(TextConverter));
    registry.register(ConverterKind::Html, Arc::new(HtmlConverter));
    registry.register(ConverterKind::Docx, Arc::new(OfficeConverter));
    registry
}

pub fn coordinator(registry: ConverterRegistry, concurrency: usize) -> BatchCoordinator {
    let service = ConversionService::new(Arc::new(registry));
    BatchCoordinator::new(Arc::new(service), concurrency).unwrap()
}

pub fn runner(storage: &Path, registry: ConverterRegistry, limits: SizeLimits) -> JobRunner {
    let manager = Arc::new(JobManager::new(
        ResultStore::new(storage),
        "http://mdpack.test",
    ));
    JobRunner::new(manager, coordinator(registry, 5), limits)
}

/// Polls until the job is terminal, returning every observed snapshot.
pub async fn wait_for_terminal(manager: &JobManager, id: JobId) -> Vec<JobSnapshot> {
    let mut observed = Vec::new();
    for _ in 0..500 {
        let snapshot = manager.get_job(id).expect("job should exist");
        let done = snapshot.status.is_terminal();
        observed.push(snapshot);
        if done {
            return observed;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} did not finish: {:?}", observed.last());
}

/// Every entry of a ZIP, by path.
pub fn read_zip(bytes: &[u8]) -> BTreeMap<String, Vec<u8>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut entries = BTreeMap::new();
    for index in 0..archive.len() {
        let mut file = archive.by_index(index).unwrap();
        let mut data = Vec::new();
        file.read_to_end(&mut data).unwrap();
        entries.insert(file.name().to_string(), data);
    }
    entries
}

pub fn text_of(entries: &BTreeMap<String, Vec<u8>>, path: &str) -> String {
    let data = entries
        .get(path)
        .unwrap_or_else(|| panic!("missing {path}; have {:?}", entries.keys()));
    String::from_utf8(data.clone()).unwrap()
}
