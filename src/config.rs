//! Configuração do MARLIN carregada de arquivos JSON ou TOML.
//!
//! A struct [`JobFileConfig`] contém a identidade da release e os parâmetros
//! de job do nível, com blocos de override opcionais por partição.
//! As variáveis de ambiente `MARLIN_DATA_DIR`, `MARLIN_SCRATCH_DIR` e
//! `MARLIN_SCRIPTS_DIR` têm precedência sobre a seção `paths` do arquivo.
//! Tudo é lido uma única vez na partida do processo e passado por referência
//! aos componentes — não há estado global mutável.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::MarlinError;
use crate::partition::PeriodRange;

/// Configuração de nível superior de um launcher (um arquivo por nível).
#[derive(Debug, Clone, Deserialize)]
pub struct JobFileConfig {
    /// Identificador da release (ex.: `release_7.0`).
    pub release: String,

    /// Identificador do update da release (ex.: `000000`).
    pub update: String,

    /// Identificador do dataset fonte (ex.: `ICOADS_R3.0.2T`).
    pub dataset: String,

    /// Parâmetros do nível de processamento.
    pub job_config: JobParams,

    /// Caminhos raiz; variáveis de ambiente têm precedência.
    #[serde(default)]
    pub paths: PathsFile,

    /// Blocos de override por partição, chaveados por sid-dck.
    #[serde(default, flatten)]
    pub partitions: HashMap<String, PartitionOverride>,
}

/// Parâmetros de job de um nível de processamento.
#[derive(Debug, Clone, Deserialize)]
pub struct JobParams {
    /// Nível alvo produzido por este launcher (ex.: `level1b`).
    pub data_level: String,

    /// Nível fonte lido por este launcher (ex.: `level1a`).
    pub source_level: String,

    /// Tabela CDM usada para sondar a existência do arquivo fonte mensal.
    #[serde(default = "default_source_table")]
    pub source_table: String,

    /// Nome do script de processamento em `scripts_dir`.
    pub script_name: String,

    /// Limite de tempo padrão, horas.
    #[serde(default)]
    pub job_time_hr: String,

    /// Limite de tempo padrão, minutos.
    #[serde(default)]
    pub job_time_min: String,

    /// Limite de memória padrão em MB.
    #[serde(default)]
    pub job_memo_mb: Option<u32>,
}

// Tabela padrão para sondagem dos arquivos fonte: "header".
fn default_source_table() -> String {
    "header".to_string()
}

/// Override de recursos para uma partição específica.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartitionOverride {
    pub job_time_hr: Option<String>,
    pub job_time_min: Option<String>,
    pub job_memo_mb: Option<u32>,
}

/// Seção `paths` do arquivo de configuração.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsFile {
    pub data_dir: Option<PathBuf>,
    pub scratch_dir: Option<PathBuf>,
    pub scripts_dir: Option<PathBuf>,
}

/// Caminhos raiz resolvidos, imutáveis após a partida.
#[derive(Debug, Clone)]
pub struct Paths {
    pub data_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub scripts_dir: PathBuf,
}

/// Resolve os caminhos raiz: variável de ambiente, senão arquivo.
pub fn resolve_paths(file: &PathsFile) -> Result<Paths, MarlinError> {
    resolve_paths_with(file, |k| std::env::var(k).ok())
}

fn resolve_paths_with(
    file: &PathsFile,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Paths, MarlinError> {
    let pick = |var: &str, from_file: &Option<PathBuf>| -> Result<PathBuf, MarlinError> {
        if let Some(v) = env(var)
            && !v.is_empty()
        {
            return Ok(PathBuf::from(v));
        }
        from_file
            .clone()
            .ok_or_else(|| MarlinError::Config(format!("missing path: set {var} or paths section")))
    };
    Ok(Paths {
        data_dir: pick("MARLIN_DATA_DIR", &file.data_dir)?,
        scratch_dir: pick("MARLIN_SCRATCH_DIR", &file.scratch_dir)?,
        scripts_dir: pick("MARLIN_SCRIPTS_DIR", &file.scripts_dir)?,
    })
}

impl JobFileConfig {
    /// Carrega a configuração de um arquivo JSON ou TOML (pela extensão).
    pub fn load(path: &Path) -> Result<Self, MarlinError> {
        if !path.is_file() {
            return Err(MarlinError::MissingFile(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(toml::from_str(&contents)?)
        }
    }

    /// Resolve o limite de tempo `HH:MM:00` de uma partição:
    /// override da partição se presente, senão o padrão global.
    pub fn resolve_time(&self, sid_dck: &str) -> Result<String, MarlinError> {
        let ov = self.partitions.get(sid_dck);
        let hr = ov
            .and_then(|o| o.job_time_hr.clone())
            .unwrap_or_else(|| self.job_config.job_time_hr.clone());
        let min = ov
            .and_then(|o| o.job_time_min.clone())
            .unwrap_or_else(|| self.job_config.job_time_min.clone());
        if hr.is_empty() {
            return Err(MarlinError::MissingValue {
                key: "job_time_hr",
                sid_dck: sid_dck.to_string(),
            });
        }
        if min.is_empty() {
            return Err(MarlinError::MissingValue {
                key: "job_time_min",
                sid_dck: sid_dck.to_string(),
            });
        }
        Ok(format!("{hr}:{min}:00"))
    }

    /// Resolve o limite de memória em MB de uma partição.
    pub fn resolve_memory_mb(&self, sid_dck: &str) -> Result<u32, MarlinError> {
        self.partitions
            .get(sid_dck)
            .and_then(|o| o.job_memo_mb)
            .or(self.job_config.job_memo_mb)
            .ok_or_else(|| MarlinError::MissingValue {
                key: "job_memo_mb",
                sid_dck: sid_dck.to_string(),
            })
    }

    /// Validação fail-fast: tempo e memória devem resolver para valores
    /// não vazios para TODAS as partições listadas antes de qualquer
    /// submissão ao scheduler.
    pub fn validate_resources<'a>(
        &self,
        sids: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), MarlinError> {
        for sid in sids {
            self.resolve_time(sid)?;
            self.resolve_memory_mb(sid)?;
        }
        Ok(())
    }
}

/// Arquivo de períodos da release: `sid-dck -> {year_init, year_end}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PeriodConfig(HashMap<String, PeriodEntry>);

#[derive(Debug, Clone, Deserialize)]
pub struct PeriodEntry {
    pub year_init: i32,
    pub year_end: i32,
}

impl PeriodConfig {
    /// Carrega o arquivo JSON de períodos.
    pub fn load(path: &Path) -> Result<Self, MarlinError> {
        if !path.is_file() {
            return Err(MarlinError::MissingFile(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Intervalo configurado para uma partição, se houver.
    pub fn range(&self, sid_dck: &str) -> Option<PeriodRange> {
        self.0
            .get(sid_dck)
            .map(|e| PeriodRange::from_years(e.year_init, e.year_end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn base_toml() -> &'static str {
        r#"
            release = "release_7.0"
            update = "000000"
            dataset = "ICOADS_R3.0.2T"

            [job_config]
            data_level = "level1b"
            source_level = "level1a"
            script_name = "level1b.py"
            job_time_hr = "02"
            job_time_min = "00"
            job_memo_mb = 3000

            ["103-792"]
            job_memo_mb = 8000
        "#
    }

    #[test]
    fn deserialize_toml_with_partition_override() {
        let config: JobFileConfig = toml::from_str(base_toml()).unwrap();
        assert_eq!(config.release, "release_7.0");
        assert_eq!(config.job_config.source_table, "header");
        assert_eq!(config.partitions["103-792"].job_memo_mb, Some(8000));
    }

    #[test]
    fn memory_override_beats_global_default() {
        let config: JobFileConfig = toml::from_str(base_toml()).unwrap();
        assert_eq!(config.resolve_memory_mb("103-792").unwrap(), 8000);
        assert_eq!(config.resolve_memory_mb("063-714").unwrap(), 3000);
    }

    #[test]
    fn time_resolves_per_field() {
        let mut config: JobFileConfig = toml::from_str(base_toml()).unwrap();
        assert_eq!(config.resolve_time("063-714").unwrap(), "02:00:00");

        config.partitions.insert(
            "063-714".into(),
            PartitionOverride {
                job_time_hr: Some("08".into()),
                ..Default::default()
            },
        );
        // Hour overridden, minutes fall back to the global default.
        assert_eq!(config.resolve_time("063-714").unwrap(), "08:00:00");
    }

    #[test]
    fn empty_time_is_a_config_error() {
        let toml_str = r#"
            release = "r"
            update = "0"
            dataset = "d"

            [job_config]
            data_level = "level1b"
            source_level = "level1a"
            script_name = "x.py"
            job_memo_mb = 100
        "#;
        let config: JobFileConfig = toml::from_str(toml_str).unwrap();
        let err = config.resolve_time("103-792").unwrap_err();
        assert!(matches!(
            err,
            MarlinError::MissingValue { key: "job_time_hr", .. }
        ));
        assert!(config.validate_resources(["103-792"]).is_err());
    }

    #[test]
    fn load_json_variant() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("level1b.json");
        fs::write(
            &path,
            r#"{
                "release": "release_7.0",
                "update": "000000",
                "dataset": "ICOADS_R3.0.2T",
                "job_config": {
                    "data_level": "level1b",
                    "source_level": "level1a",
                    "script_name": "level1b.py",
                    "job_time_hr": "02",
                    "job_time_min": "30",
                    "job_memo_mb": 3000
                },
                "103-792": { "job_memo_mb": 8000 }
            }"#,
        )
        .unwrap();

        let config = JobFileConfig::load(&path).unwrap();
        assert_eq!(config.resolve_time("103-792").unwrap(), "02:30:00");
        assert_eq!(config.resolve_memory_mb("103-792").unwrap(), 8000);
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let err = JobFileConfig::load(Path::new("/no/such/config.toml")).unwrap_err();
        assert!(matches!(err, MarlinError::MissingFile(_)));
    }

    #[test]
    fn paths_env_has_precedence_over_file() {
        let file = PathsFile {
            data_dir: Some(PathBuf::from("/from/file")),
            scratch_dir: Some(PathBuf::from("/scratch")),
            scripts_dir: Some(PathBuf::from("/scripts")),
        };
        let paths = resolve_paths_with(&file, |k| {
            (k == "MARLIN_DATA_DIR").then(|| "/from/env".to_string())
        })
        .unwrap();
        assert_eq!(paths.data_dir, PathBuf::from("/from/env"));
        assert_eq!(paths.scratch_dir, PathBuf::from("/scratch"));
    }

    #[test]
    fn paths_missing_everywhere_is_an_error() {
        let err = resolve_paths_with(&PathsFile::default(), |_| None).unwrap_err();
        assert!(matches!(err, MarlinError::Config(_)));
    }

    #[test]
    fn period_config_maps_to_ranges() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("source_deck_periods.json");
        fs::write(
            &path,
            r#"{ "103-792": { "year_init": 1950, "year_end": 2010 } }"#,
        )
        .unwrap();

        let periods = PeriodConfig::load(&path).unwrap();
        let range = periods.range("103-792").unwrap();
        assert_eq!(range.start.to_string(), "1950-01");
        assert_eq!(range.end.to_string(), "2010-12");
        assert!(periods.range("999-999").is_none());
    }
}
