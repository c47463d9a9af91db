/// 导出到本地文件 (默认: 系统下载目录)
use std::fs;
use std::path::PathBuf;

use super::Exporter;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct FileExporter {
    dir: PathBuf,
}

impl FileExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// 下载目录; 取不到时用当前目录
    pub fn downloads() -> Self {
        Self::new(dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

impl Exporter for FileExporter {
    fn export(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file_name);
        fs::write(&path, bytes)?;
        Ok(path)
    }
}
