//! Hand-rolled in-memory doubles for [`crate::handlers`] unit tests, in the
//! same spirit as `sda_broker`'s `FakeBroker` (§9: "tests become
//! straightforward" once stores are behind a trait).

#![cfg(test)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use sda_core::{
    traits::{FileInfo, FileStore, HealthCheck, HeaderReencryptor, ObjectStore, UserFile},
    types::{AccessionCheck, ArchiveInfo, CorrelationId, DatasetEventType, DatasetId, FileEventType, FileId, VerifiedInfo},
    Error, Result,
};

struct FileRow {
    info: FileInfo,
    header: Vec<u8>,
}

/// In-memory [`FileStore`]. Only the behavior the handlers in this crate
/// exercise is modeled; anything else panics so a test relying on
/// unimplemented behavior fails loudly rather than silently no-opping.
#[derive(Default)]
pub struct FakeStore {
    files: Mutex<HashMap<FileId, FileRow>>,
    by_path: Mutex<HashMap<(String, String), FileId>>,
    by_accession: Mutex<HashMap<String, FileId>>,
    datasets: Mutex<HashMap<String, DatasetId>>,
    dataset_events: Mutex<Vec<(DatasetId, DatasetEventType, String)>>,
    mappings: Mutex<Vec<(String, String)>>,
    events: Mutex<Vec<(FileId, FileEventType)>>,
}

impl FakeStore {
    pub fn seed_registered(&self, user: &str, path: &str) -> FileId {
        let file_id = FileId::new();
        self.files.lock().unwrap().insert(
            file_id,
            FileRow {
                info: FileInfo {
                    file_id,
                    submission_user: user.to_string(),
                    submission_file_path: path.to_string(),
                    status: FileEventType::Registered,
                    stable_id: None,
                    archive_file_path: None,
                    archive_file_size: None,
                    key_hash: None,
                },
                header: Vec::new(),
            },
        );
        self.by_path.lock().unwrap().insert((user.to_string(), path.to_string()), file_id);
        file_id
    }

    pub fn events_for(&self, file_id: FileId) -> Vec<FileEventType> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == file_id)
            .map(|(_, ev)| *ev)
            .collect()
    }
}

#[async_trait]
impl HealthCheck for FakeStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl FileStore for FakeStore {
    async fn register_file(&self, inbox_path: &str, user: &str) -> Result<FileId> {
        let key = (user.to_string(), inbox_path.to_string());
        if let Some(id) = self.by_path.lock().unwrap().get(&key) {
            self.events.lock().unwrap().push((*id, FileEventType::Registered));
            return Ok(*id);
        }
        Ok(self.seed_registered(user, inbox_path))
    }

    async fn update_file_event_log(
        &self,
        file_id: FileId,
        event: FileEventType,
        _correlation_id: CorrelationId,
        _user: &str,
        _details: Option<Value>,
        _message: &str,
    ) -> Result<()> {
        self.events.lock().unwrap().push((file_id, event));
        Ok(())
    }

    async fn store_header(&self, file_id: FileId, header: &[u8]) -> Result<()> {
        self.files
            .lock()
            .unwrap()
            .get_mut(&file_id)
            .ok_or_else(|| Error::NotFound(file_id.to_string()))?
            .header = header.to_vec();
        Ok(())
    }

    async fn get_header(&self, file_id: FileId) -> Result<Vec<u8>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(&file_id)
            .ok_or_else(|| Error::NotFound(file_id.to_string()))?
            .header
            .clone())
    }

    async fn set_archived(&self, file_id: FileId, _correlation_id: CorrelationId, info: &ArchiveInfo) -> Result<()> {
        let mut files = self.files.lock().unwrap();
        let row = files.get_mut(&file_id).ok_or_else(|| Error::NotFound(file_id.to_string()))?;
        row.info.archive_file_path = Some(info.archive_file_path.clone());
        row.info.archive_file_size = Some(info.archive_file_size);
        row.info.status = FileEventType::Archived;
        drop(files);
        self.events.lock().unwrap().push((file_id, FileEventType::Archived));
        Ok(())
    }

    async fn set_verified(&self, file_id: FileId, _correlation_id: CorrelationId, _info: &VerifiedInfo) -> Result<()> {
        let mut files = self.files.lock().unwrap();
        let row = files.get_mut(&file_id).ok_or_else(|| Error::NotFound(file_id.to_string()))?;
        row.info.status = FileEventType::Verified;
        drop(files);
        self.events.lock().unwrap().push((file_id, FileEventType::Verified));
        Ok(())
    }

    async fn set_accession_id(&self, stable_id: &str, file_id: FileId) -> Result<()> {
        let mut files = self.files.lock().unwrap();
        let row = files.get_mut(&file_id).ok_or_else(|| Error::NotFound(file_id.to_string()))?;
        row.info.stable_id = Some(stable_id.to_string());
        drop(files);
        self.by_accession.lock().unwrap().insert(stable_id.to_string(), file_id);
        Ok(())
    }

    async fn check_accession_id_exists(&self, stable_id: &str, file_id: FileId) -> Result<AccessionCheck> {
        Ok(match self.by_accession.lock().unwrap().get(stable_id) {
            None => AccessionCheck::Unused,
            Some(owner) if *owner == file_id => AccessionCheck::Same,
            Some(_) => AccessionCheck::Duplicate,
        })
    }

    async fn map_files_to_dataset(&self, dataset_stable_id: &str, accession_ids: &[String]) -> Result<()> {
        let dataset_id = *self
            .datasets
            .lock()
            .unwrap()
            .entry(dataset_stable_id.to_string())
            .or_insert_with(DatasetId::new);
        for accession in accession_ids {
            if !self.by_accession.lock().unwrap().contains_key(accession) {
                return Err(Error::NotFound(accession.clone()));
            }
            self.mappings.lock().unwrap().push((dataset_stable_id.to_string(), accession.clone()));
        }
        let _ = dataset_id;
        Ok(())
    }

    async fn get_dataset_id(&self, stable_id: &str) -> Result<DatasetId> {
        self.datasets
            .lock()
            .unwrap()
            .get(stable_id)
            .copied()
            .ok_or_else(|| Error::NotFound(stable_id.to_string()))
    }

    async fn update_dataset_event(&self, dataset_id: DatasetId, event: DatasetEventType, message: &str) -> Result<()> {
        self.dataset_events.lock().unwrap().push((dataset_id, event, message.to_string()));
        Ok(())
    }

    async fn get_file_status(&self, _correlation_id: CorrelationId) -> Result<FileEventType> {
        unimplemented!("not exercised by handler tests")
    }

    async fn get_file_info(&self, file_id: FileId) -> Result<FileInfo> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(&file_id)
            .ok_or_else(|| Error::NotFound(file_id.to_string()))?
            .info
            .clone())
    }

    async fn get_inbox_path(&self, _stable_id: &str) -> Result<String> {
        unimplemented!("not exercised by handler tests")
    }

    async fn get_archive_path(&self, _stable_id: &str) -> Result<String> {
        unimplemented!("not exercised by handler tests")
    }

    async fn get_header_for_stable_id(&self, _stable_id: &str) -> Result<Vec<u8>> {
        unimplemented!("not exercised by handler tests")
    }

    async fn get_sync_data(&self, _stable_id: &str) -> Result<Value> {
        unimplemented!("not exercised by handler tests")
    }

    async fn list_active_users(&self) -> Result<Vec<String>> {
        unimplemented!("not exercised by handler tests")
    }

    async fn get_user_files(&self, _user: &str) -> Result<Vec<UserFile>> {
        unimplemented!("not exercised by handler tests")
    }

    async fn get_corr_id(&self, _user: &str, _path: &str) -> Result<CorrelationId> {
        unimplemented!("not exercised by handler tests")
    }

    async fn find_file_id_by_path(&self, user: &str, path: &str) -> Result<FileId> {
        self.by_path
            .lock()
            .unwrap()
            .get(&(user.to_string(), path.to_string()))
            .copied()
            .ok_or_else(|| Error::NotFound(format!("{user}:{path}")))
    }

    async fn add_key_hash(&self, _key_hash: &str, _description: &str) -> Result<()> {
        unimplemented!("not exercised by handler tests")
    }

    async fn set_key_hash(&self, _file_id: FileId, _key_hash: &str) -> Result<()> {
        unimplemented!("not exercised by handler tests")
    }
}

/// In-memory [`ObjectStore`] backed by a path → bytes map.
#[derive(Default)]
pub struct FakeObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeObjectStore {
    pub fn seed(&self, path: &str, bytes: Vec<u8>) {
        self.objects.lock().unwrap().insert(path.to_string(), bytes);
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        self.objects.lock().unwrap().insert(path.to_string(), data.to_vec());
        Ok(())
    }

    async fn stat_size(&self, path: &str) -> Result<i64> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))?
            .len() as i64)
    }
}

/// Pass-through [`HeaderReencryptor`]: returns the header unchanged. Good
/// enough for tests that only assert the pipeline calls reencrypt and
/// stores whatever comes back.
#[derive(Default)]
pub struct PassthroughReencryptor;

#[async_trait]
impl HeaderReencryptor for PassthroughReencryptor {
    async fn reencrypt_header(&self, header: &[u8]) -> Result<Vec<u8>> {
        Ok(header.to_vec())
    }
}
