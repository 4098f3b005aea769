use regex::{Captures, Regex};
use sim_conf::error::ConfigError;
use sim_conf::scenario::ScenarioConfig;

/// placeholder names understood by render
pub const PLACEHOLDERS:[&str;7] = ["name","seed","sampler","n_jobs","model","backend","phantom"];

fn placeholder_value(key:&str,config:&ScenarioConfig) -> Option<String> {
    Some(match key {
        "name" => config.name.clone(),
        "seed" => config.sim_conf.rng_seed.to_string(),
        "sampler" => config.sampler.name().to_string(),
        "n_jobs" => config.engine.n_jobs.to_string(),
        "model" => config.engine.model.name().to_string(),
        "backend" => config.engine.nufft_backend.name().to_string(),
        "phantom" => format!("{}{}",config.phantom.name.name(),config.phantom.sub_id),
        _ => return None
    })
}

/// fill {placeholder} fields of the output template
pub fn render(template:&str,config:&ScenarioConfig) -> Result<String,ConfigError> {
    let re = Regex::new(r"\{([^{}]*)\}").map_err(|e| ConfigError::invalid("output_template",e))?;
    let mut unknown = vec![];
    let out = re.replace_all(template,|caps:&Captures| {
        let key = &caps[1];
        placeholder_value(key,config).unwrap_or_else(|| {
            unknown.push(key.to_string());
            String::new()
        })
    }).to_string();
    if !unknown.is_empty() {
        return Err(ConfigError::invalid("output_template",format!("unknown placeholders {:?}, expected one of {:?}",unknown,PLACEHOLDERS)));
    }
    if out.contains('{') || out.contains('}') || out.trim().is_empty() {
        return Err(ConfigError::invalid("output_template",format!("cannot render {:?}",template)));
    }
    Ok(out)
}
