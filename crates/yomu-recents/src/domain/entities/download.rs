#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadStatus {
    #[default]
    NotDownloaded,
    Queued,
    Downloading,
    Downloaded,
    Error,
}

impl From<i64> for DownloadStatus {
    fn from(status: i64) -> Self {
        match status {
            1 => Self::Queued,
            2 => Self::Downloading,
            3 => Self::Downloaded,
            4 => Self::Error,
            _ => Self::NotDownloaded,
        }
    }
}
