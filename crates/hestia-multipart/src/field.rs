use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::MultipartError;

/// Serialises spool-file name allocation across all parsers in the process.
static SPOOL_SEQUENCE: Mutex<u64> = Mutex::new(0);

/// A spooled file part.
///
/// The payload lives on disk under the parser's temp directory until the
/// field is dropped, at which point the spool file is removed.
#[derive(Debug)]
pub struct FileData {
    filename: String,
    content_type: Option<String>,
    path: PathBuf,
    file: Option<File>,
    len: u64,
}

impl FileData {
    fn create(temp_dir: &Path, filename: String) -> Result<Self, MultipartError> {
        let path = {
            let mut seq = SPOOL_SEQUENCE.lock();
            loop {
                *seq += 1;
                let candidate = temp_dir.join(format!("MPFD_Temp_{}", *seq));
                if !candidate.exists() {
                    break candidate;
                }
            }
        };
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        Ok(Self {
            filename,
            content_type: None,
            path,
            file: Some(file),
            len: 0,
        })
    }

    /// The client-supplied file name from the `filename=` attribute.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The MIME type announced for the part, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Path of the spool file holding the payload.
    #[must_use]
    pub fn spool_path(&self) -> &Path {
        &self.path
    }

    /// Number of payload bytes written so far.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` when no payload bytes have been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn write(&mut self, data: &[u8]) -> Result<(), MultipartError> {
        if let Some(file) = self.file.as_mut() {
            file.write_all(data)?;
            self.len += data.len() as u64;
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(file) = self.file.take() {
            drop(file);
        }
    }
}

impl Drop for FileData {
    fn drop(&mut self) {
        self.close();
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!("could not remove spool file {:?}: {}", self.path, err);
            }
        }
    }
}

/// The payload of a parsed field.
#[derive(Debug)]
pub enum FieldData {
    /// An in-memory text value.
    Text(String),
    /// A file part spooled to disk.
    File(FileData),
}

/// One field of a multipart body.
#[derive(Debug)]
pub struct Field {
    name: String,
    data: FieldData,
}

impl Field {
    pub(crate) fn text_field(name: String) -> Self {
        Self {
            name,
            data: FieldData::Text(String::new()),
        }
    }

    pub(crate) fn text_with_content(name: String, content: String) -> Self {
        Self {
            name,
            data: FieldData::Text(content),
        }
    }

    pub(crate) fn file_field(
        name: String,
        filename: String,
        temp_dir: &Path,
    ) -> Result<Self, MultipartError> {
        Ok(Self {
            name,
            data: FieldData::File(FileData::create(temp_dir, filename)?),
        })
    }

    /// The field name from the `name=` attribute.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The field payload.
    #[must_use]
    pub fn data(&self) -> &FieldData {
        &self.data
    }

    /// The text content, or `None` for file fields.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.data {
            FieldData::Text(text) => Some(text),
            FieldData::File(_) => None,
        }
    }

    /// The file part, or `None` for text fields.
    #[must_use]
    pub fn file(&self) -> Option<&FileData> {
        match &self.data {
            FieldData::Text(_) => None,
            FieldData::File(file) => Some(file),
        }
    }

    pub(crate) fn set_content_type(&mut self, content_type: String) {
        if let FieldData::File(file) = &mut self.data {
            file.content_type = Some(content_type);
        }
    }

    pub(crate) fn accept_data(&mut self, data: &[u8]) -> Result<(), MultipartError> {
        match &mut self.data {
            FieldData::Text(text) => {
                text.push_str(&String::from_utf8_lossy(data));
                Ok(())
            }
            FieldData::File(file) => file.write(data),
        }
    }

    pub(crate) fn close(&mut self) {
        if let FieldData::File(file) = &mut self.data {
            file.close();
        }
    }
}
