/// 错误类型 (Error taxonomy)
///
/// - `ShapeMismatch`: 推理输出与类别数不匹配 → 仅中止当前tick
/// - `Encoder`:       编码器内部错误 → 记录日志, 录制继续
/// - `FinalizeFailed`: flush/封装失败 → 跳过导出, 会话重置
///
/// 信号源结束(SourceEnded)不是错误, 由调度器作为正常状态转换处理。
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("inference output shape {shape:?} is incompatible with {num_classes} classes")]
    ShapeMismatch {
        shape: Vec<usize>,
        num_classes: usize,
    },

    #[error("encoder error: {0}")]
    Encoder(String),

    #[error("finalize failed: {0}")]
    FinalizeFailed(String),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("preprocess failed: {0}")]
    Preprocess(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("render failed: {0}")]
    Render(String),

    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// 是否只影响当前tick (调度器继续运行)
    pub fn is_tick_local(&self) -> bool {
        matches!(
            self,
            Error::ShapeMismatch { .. }
                | Error::InvalidFrame(_)
                | Error::Preprocess(_)
                | Error::Inference(_)
                | Error::Render(_)
                | Error::Encoder(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_local_errors() {
        let err = Error::ShapeMismatch {
            shape: vec![1, 7, 10],
            num_classes: 1,
        };
        assert!(err.is_tick_local());
        assert!(err.to_string().contains("[1, 7, 10]"));
        assert!(!Error::FinalizeFailed("trailer".into()).is_tick_local());
    }
}
