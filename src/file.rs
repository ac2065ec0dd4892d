/// A file that was sniffed, validated and persisted by the storage backend.
///
/// Values are only produced by the upload pipeline after a successful store.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Multipart field the file was attached to.
    pub field_name: String,
    /// File name supplied by the client.
    pub original_name: String,
    /// Name generated for storage.
    pub uploaded_file_name: String,
    /// Folder or bucket the backend wrote the file to.
    pub folder_destination: String,
    /// Backend key used to address the stored object.
    pub storage_key: String,
    /// Content type detected from the leading bytes of the file.
    pub mime_type: String,
    /// Authoritative size in bytes as reported by the backend.
    pub size: u64,
}
