//! User-facing notices.
//!
//! Every recovered error and every confirmation reaches the user the same way: a [`Notice`] with
//! a severity tag, queued by the application and drained by whichever host is displaying them.

use crate::LaudoError;
use laudo_files::AssetError;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub severity: Severity,
    pub message: String,
}

impl Notice {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(Severity::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// The message shown to the user for an error.
    pub fn from_error(err: &LaudoError) -> Self {
        match err {
            LaudoError::Validation(message) => Self::error(message.clone()),
            LaudoError::NotFound(_) => Self::warning("Exame não encontrado no catálogo"),
            LaudoError::Decode(_) => Self::warning("Rascunho inválido ignorado"),
            LaudoError::Asset(asset) => Self::error(asset_message(asset)),
            LaudoError::Render(_) => Self::error("Erro ao exportar laudo"),
            LaudoError::InvalidInput(message) => Self::error(message.clone()),
            LaudoError::Storage(_) | LaudoError::Serialization(_) => {
                Self::error("Erro ao salvar dados")
            }
            LaudoError::Config(message) => Self::error(message.clone()),
            LaudoError::SessionClosed => Self::error("Sessão encerrada"),
        }
    }
}

fn asset_message(err: &AssetError) -> String {
    match err {
        AssetError::UnsupportedType { .. } => "Apenas imagens são permitidas".to_string(),
        AssetError::TooLarge { limit_label, .. } => {
            format!("Imagem muito grande (máx: {})", limit_label)
        }
        AssetError::Empty(name) => format!("Arquivo vazio: {}", name),
        AssetError::Image { .. } => "Erro ao carregar imagem".to_string(),
        AssetError::DataUri(_) | AssetError::Io(_) => "Erro ao ler arquivo".to_string(),
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)
    }
}

/// FIFO of notices waiting to be shown.
#[derive(Debug, Default)]
pub struct NoticeQueue {
    pending: VecDeque<Notice>,
}

impl NoticeQueue {
    pub fn push(&mut self, notice: Notice) {
        tracing::debug!(severity = %notice.severity, "notice: {}", notice.message);
        self.pending.push_back(notice);
    }

    pub fn extend(&mut self, notices: impl IntoIterator<Item = Notice>) {
        for notice in notices {
            self.push(notice);
        }
    }

    pub fn drain(&mut self) -> Vec<Notice> {
        self.pending.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let validation = LaudoError::Validation("Preencha o nome do paciente".into());
        assert_eq!(
            Notice::from_error(&validation),
            Notice::error("Preencha o nome do paciente")
        );

        let too_large = LaudoError::Asset(AssetError::TooLarge {
            file_name: "x.png".into(),
            size_label: "12 MB".into(),
            limit_label: "10 MB".into(),
        });
        assert_eq!(
            Notice::from_error(&too_large).message,
            "Imagem muito grande (máx: 10 MB)"
        );

        let missing = LaudoError::NotFound("exam ecg".into());
        assert_eq!(Notice::from_error(&missing).severity, Severity::Warning);
    }

    #[test]
    fn test_queue_drains_in_order() {
        let mut queue = NoticeQueue::default();
        queue.push(Notice::info("um"));
        queue.extend([Notice::success("dois"), Notice::error("três")]);

        let drained: Vec<_> = queue.drain().into_iter().map(|n| n.message).collect();
        assert_eq!(drained, vec!["um", "dois", "três"]);
        assert!(queue.is_empty());
    }
}
