use std::{ fs, path::Path };

use anyhow::{ Context, Result, anyhow };
use tracing::debug;

pub const TARGET_PLACEHOLDER: &str = "{TARGET_IPS}";

pub fn render(template: &str, ips: &[String]) -> String {
    template.replace(TARGET_PLACEHOLDER, &ips.join(","))
}

pub fn load_and_render(path: &Path, ips: &[String]) -> Result<String> {
    debug!("loading scan template {:?}", path);
    let template = fs
        ::read_to_string(path)
        .context(format!("cannot read template file {:?}", path))?;
    if !template.contains(TARGET_PLACEHOLDER) {
        return Err(anyhow!("template {:?} has no {} placeholder", path, TARGET_PLACEHOLDER));
    }
    Ok(render(&template, ips))
}
