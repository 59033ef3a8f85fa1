use std::io::Write;
use std::path::Path;

use anyhow::Result;
use dabplus::process::fic::{FicDirectory, FicStats};
use dabplus::structs::label::FicLabel;
use dabplus::structs::service::{Service, SubchannelOrga};
use serde::Serialize;

/// Ensemble directory as written by `fic --yaml`.
#[derive(Debug, Serialize)]
pub struct DirectoryReport {
    creation_tool: String,
    creation_tool_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    ensemble: Option<EnsembleReport>,
    services: Vec<ServiceReport>,
    stats: StatsReport,
}

#[derive(Debug, Serialize)]
struct LabelReport {
    text: String,
    short: String,
    charset: u8,
}

impl From<&FicLabel> for LabelReport {
    fn from(label: &FicLabel) -> Self {
        Self {
            text: label.text().trim_end().to_string(),
            short: label.short_text(),
            charset: label.charset,
        }
    }
}

#[derive(Debug, Serialize)]
struct EnsembleReport {
    eid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<LabelReport>,
}

#[derive(Debug, Serialize)]
enum AudioType {
    #[serde(rename = "DAB")]
    Dab,
    #[serde(rename = "DAB+")]
    DabPlus,
}

#[derive(Debug, Serialize)]
struct ServiceReport {
    sid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<LabelReport>,
    audio: AudioType,
    subchannel: SubchannelReport,
}

#[derive(Debug, Serialize)]
struct SubchannelReport {
    id: u8,
    start_cu: u16,
    size_cu: u16,
    protection: String,
    bitrate: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    fec_scheme: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frame_len: Option<usize>,
}

impl From<&SubchannelOrga> for SubchannelReport {
    fn from(orga: &SubchannelOrga) -> Self {
        Self {
            id: orga.subchid,
            start_cu: orga.start_cu,
            size_cu: orga.size_cu,
            protection: orga.protection.to_string(),
            bitrate: orga.bitrate,
            fec_scheme: orga.fec_scheme,
            frame_len: orga.frame_len(),
        }
    }
}

impl From<&Service> for ServiceReport {
    fn from(service: &Service) -> Self {
        Self {
            sid: format!("{:#06X}", service.sid),
            label: service.label.as_ref().map(LabelReport::from),
            audio: if service.audio.dab_plus {
                AudioType::DabPlus
            } else {
                AudioType::Dab
            },
            subchannel: SubchannelReport::from(&service.subchannel),
        }
    }
}

#[derive(Debug, Serialize)]
struct StatsReport {
    fibs: u64,
    fib_crc_errors: u64,
    figs: u64,
    fig_errors: u64,
}

impl DirectoryReport {
    pub fn new(directory: &FicDirectory, stats: &FicStats) -> Self {
        let ensemble = directory.ensemble.is_set().then(|| EnsembleReport {
            eid: format!("{:#06X}", directory.ensemble.eid),
            label: directory.ensemble.label.as_ref().map(LabelReport::from),
        });

        Self {
            creation_tool: env!("CARGO_PKG_NAME").to_string(),
            creation_tool_version: env!("CARGO_PKG_VERSION").to_string(),
            ensemble,
            services: directory.services.values().map(ServiceReport::from).collect(),
            stats: StatsReport {
                fibs: stats.fibs,
                fib_crc_errors: stats.fib_crc_errors,
                figs: stats.figs,
                fig_errors: stats.fig_errors,
            },
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Writes the report to `path`, "-" for stdout.
    pub fn write(&self, path: &Path) -> Result<()> {
        let yaml = self.to_yaml()?;

        if path.to_string_lossy() == "-" {
            std::io::stdout().lock().write_all(yaml.as_bytes())?;
        } else {
            std::fs::write(path, yaml)?;
            log::info!("Directory written to {}", path.display());
        }

        Ok(())
    }
}

#[test]
fn directory_yaml() -> Result<()> {
    use dabplus::structs::service::{AudioService, Ensemble};

    let mut label = FicLabel {
        short_label_mask: 0xF000,
        ..Default::default()
    };
    label.label.copy_from_slice(b"Jazz Radio      ");

    let service = Service {
        sid: 0xD210,
        subchannel: SubchannelOrga::eep(4, 0, 0, 2, 72),
        audio: AudioService {
            subchid: 4,
            dab_plus: true,
        },
        label: Some(label),
    };

    let mut directory = FicDirectory {
        ensemble: Ensemble {
            eid: 0x10CE,
            label: None,
        },
        ..Default::default()
    };
    directory.services.insert(service.sid, service);

    let yaml = DirectoryReport::new(&directory, &FicStats::default()).to_yaml()?;
    let value: serde_yaml_ng::Value = serde_yaml_ng::from_str(&yaml)?;

    assert_eq!(value["ensemble"]["eid"].as_str(), Some("0x10CE"));
    assert!(value["ensemble"].get("label").is_none());

    let service = &value["services"][0];
    assert_eq!(service["sid"].as_str(), Some("0xD210"));
    assert_eq!(service["label"]["text"].as_str(), Some("Jazz Radio"));
    assert_eq!(service["label"]["short"].as_str(), Some("Jazz"));
    assert_eq!(service["audio"].as_str(), Some("DAB+"));
    assert_eq!(service["subchannel"]["protection"].as_str(), Some("EEP 3-A"));
    assert_eq!(service["subchannel"]["frame_len"].as_u64(), Some(288));
    assert!(service["subchannel"].get("fec_scheme").is_none());
    Ok(())
}
