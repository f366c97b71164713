use diet_engine::DailyDiet;
use serde::{Deserialize, Serialize};

use crate::config::ExportConfig;

use super::data::Patient;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("document export is not configured")]
    NotConfigured,
    #[error("export service failed: {0}")]
    Reqwest(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportLink {
    pub url: String,
}

#[derive(Debug, Serialize)]
struct ExportRequest<'a> {
    patient_id: i64,
    patient_name: String,
    diet: &'a DailyDiet,
}

/// Client for the document rendering service.
#[derive(Debug, Clone)]
pub struct ExportClient {
    client: reqwest::Client,
    service_url: Option<String>,
}

impl ExportClient {
    pub fn new(cfg: &ExportConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            service_url: cfg.service_url.as_ref()
                .map(|v| v.trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool { self.service_url.is_some() }

    pub async fn export(&self, patient: &Patient, diet: &DailyDiet) -> Result<ExportLink, ExportError> {
        let base = self.service_url.as_ref().ok_or(ExportError::NotConfigured)?;

        tracing::info!("exporting diet of patient {}", patient.id);
        let link = self.client.post(format!("{base}/documents"))
            .json(&ExportRequest {
                patient_id: patient.id,
                patient_name: patient.full_name(),
                diet,
            })
            .send().await?
            .error_for_status()?
            .json::<ExportLink>().await?;

        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_url_disables_export() {
        let client = ExportClient::new(&ExportConfig { service_url: Some("".into()) });
        assert!(!client.is_configured());

        let client = ExportClient::new(&ExportConfig { service_url: Some("http://render.local/".into()) });
        assert_eq!(client.service_url.as_deref(), Some("http://render.local"));
    }
}
