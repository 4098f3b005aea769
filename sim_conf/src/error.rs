use thiserror::Error;

#[derive(Debug,Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("shape {shape:?} and fov_mm {fov_mm:?} must both have 3 entries")]
    ShapeFovMismatch {
        shape:Vec<usize>,
        fov_mm:Vec<f64>,
    },
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        field:String,
        reason:String,
    },
    #[error("unsupported combination: {0}")]
    Unsupported(String),
    #[error("bad override {0:?}, expected dotted.key=value")]
    BadOverride(String),
}

impl ConfigError {
    pub fn invalid(field:&str,reason:impl ToString) -> Self {
        ConfigError::InvalidValue{field:field.to_string(),reason:reason.to_string()}
    }
}
