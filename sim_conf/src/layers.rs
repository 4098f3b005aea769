use std::fs::File;
use std::io::Read;
use std::path::Path;
use toml::Value;
use tracing::debug;
use crate::error::ConfigError;
use crate::scenario::ScenarioConfig;

/// Ordered stack of configuration documents. Later layers override earlier ones: tables are merged
/// key by key, any other value (including arrays) is replaced.
#[derive(Clone,Debug)]
pub struct ConfigLayers {
    layers:Vec<(String,Value)>,
}

impl ConfigLayers {

    /// empty stack. Missing keys fall back to the serde defaults on resolve
    pub fn new() -> Self {
        Self {
            layers: vec![],
        }
    }

    /// stack starting with the built-in defaults
    pub fn with_defaults() -> Result<Self,ConfigError> {
        let mut l = Self::new();
        l.layers.push((String::from("defaults"),Value::try_from(ScenarioConfig::default())?));
        Ok(l)
    }

    pub fn push_str(&mut self,source:&str,text:&str) -> Result<&mut Self,ConfigError> {
        let v:Value = toml::from_str(text)?;
        self.layers.push((source.to_string(),v));
        Ok(self)
    }

    pub fn push_file(&mut self,path:&Path) -> Result<&mut Self,ConfigError> {
        let mut f = File::open(path)?;
        let mut s = String::new();
        f.read_to_string(&mut s)?;
        self.push_str(&path.to_string_lossy(),&s)
    }

    /// single dotted.key=value override, as given on a command line. Values that are not valid toml
    /// are taken as strings
    pub fn push_override(&mut self,assignment:&str) -> Result<&mut Self,ConfigError> {
        let (key,raw) = assignment.split_once('=').ok_or(ConfigError::BadOverride(assignment.to_string()))?;
        let key = key.trim();
        if key.is_empty() || key.split('.').any(|k| k.is_empty()) {
            return Err(ConfigError::BadOverride(assignment.to_string()));
        }
        let value = match toml::from_str::<Value>(&format!("v = {}",raw.trim())) {
            Ok(Value::Table(mut t)) => t.remove("v").unwrap_or(Value::String(raw.trim().to_string())),
            _ => Value::String(raw.trim().to_string())
        };
        let nested = key.rsplit('.').fold(value,|acc,k| {
            let mut t = toml::value::Table::new();
            t.insert(k.to_string(),acc);
            Value::Table(t)
        });
        self.layers.push((format!("override {}",key),nested));
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// merged document before deserialization
    pub fn merged(&self) -> Value {
        let mut base = Value::Table(toml::value::Table::new());
        for (source,layer) in self.layers.iter() {
            debug!("merging configuration layer {}",source);
            merge(&mut base,layer.clone());
        }
        base
    }

    /// merge every layer and validate the result
    pub fn resolve(&self) -> Result<ScenarioConfig,ConfigError> {
        let config:ScenarioConfig = self.merged().try_into()?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigLayers {
    fn default() -> Self {
        Self::new()
    }
}

fn merge(base:&mut Value,over:Value) {
    match (base,over) {
        (Value::Table(b),Value::Table(o)) => {
            for (k,v) in o {
                match b.get_mut(&k) {
                    Some(existing) => merge(existing,v),
                    None => {b.insert(k,v);}
                }
            }
        }
        (b,o) => *b = o,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{SamplerConfig, NufftBackend};

    #[test]
    fn later_layers_win() {
        let mut l = ConfigLayers::with_defaults().unwrap();
        l.push_str("scenario","name = \"a\"\n[sim_conf]\nshape = [8, 8, 4]\nfov_mm = [8.0, 8.0, 4.0]\n[sim_conf.seq]\nTR = 20\nTE = 10\n").unwrap();
        l.push_override("sim_conf.seq.TE=12").unwrap();
        l.push_override("name=b").unwrap();
        let c = l.resolve().unwrap();
        assert_eq!(c.name,"b");
        assert_eq!(c.sim_conf.seq.tr_ms,20.0);
        assert_eq!(c.sim_conf.seq.te_ms,12.0);
        // untouched keys keep their defaults
        assert_eq!(c.sim_conf.seq.fa_deg,15.0);
        assert_eq!(c.sim_conf.hardware.n_coils,8);
        assert_eq!(c.sim_conf.dims(),[8,8,4]);
    }

    #[test]
    fn variant_switch_in_override() {
        let mut l = ConfigLayers::with_defaults().unwrap();
        l.push_str("scenario","[sampler]\nkind = \"cartesian\"\n[engine]\nnufft_backend = \"fft\"\n").unwrap();
        let c = l.resolve().unwrap();
        assert_eq!(c.sampler,SamplerConfig::Cartesian{accel:1});
        assert_eq!(c.engine.nufft_backend,NufftBackend::Fft);
    }

    #[test]
    fn resolve_validates() {
        let mut l = ConfigLayers::with_defaults().unwrap();
        l.push_override("sim_conf.shape=[64, 64]").unwrap();
        assert!(matches!(l.resolve(),Err(ConfigError::ShapeFovMismatch{..})));
        assert!(matches!(l.push_override("no_equals_sign"),Err(ConfigError::BadOverride(_))));
    }

    #[test]
    fn reads_layer_files() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("scenario.toml");
        std::fs::write(&p,"[engine]\nn_jobs = 3\n").unwrap();
        let mut l = ConfigLayers::with_defaults().unwrap();
        l.push_file(&p).unwrap();
        assert_eq!(l.len(),2);
        assert_eq!(l.resolve().unwrap().engine.n_jobs,3);
    }
}
