//! Intended-config rendering.
//!
//! Templates are Jinja (`.j2`) files rendered with `minijinja`, with
//! `trim_blocks` and `lstrip_blocks` enabled. The context is the device's
//! inventory variables plus `inventory_hostname`, `host` and `port`. Printing
//! an undefined variable is an error; `if` tests and the `default` filter
//! still see undefined values. Rendering runs sequentially, before any
//! deployment task is spawned.

use std::collections::BTreeMap;
use std::path::PathBuf;

use minijinja::{Environment, UndefinedBehavior};
use serde_yaml::Value;
use tracing::{debug, info};

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::models::device::Device;
use crate::storage::layout::StorageLayout;

/// Produces the intended configuration text of a device
pub trait Renderer {
    fn render(&self, device: &Device) -> Result<String, DeployError>;
}

/// Renders a fixed list of templates and concatenates the results
pub struct TemplateRenderer {
    env: Environment<'static>,
    templates: Vec<(String, String)>,
}

impl TemplateRenderer {
    /// Build from in-memory `(name, body)` pairs, rendered in order
    pub fn new(templates: Vec<(String, String)>) -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_undefined_behavior(UndefinedBehavior::SemiStrict);
        Self { env, templates }
    }

    /// Load `names` from `dir`; missing templates are skipped
    pub async fn load(dir: &Dir, names: &[String]) -> Result<Self, DeployError> {
        let mut templates = Vec::new();
        for name in names {
            let file = dir.file(name);
            if !file.exists().await {
                debug!("Template {} not found, skipping", file.path().display());
                continue;
            }
            templates.push((name.clone(), file.read_string().await?));
        }
        if templates.is_empty() {
            return Err(DeployError::RenderError(format!(
                "no templates found in {}",
                dir.path().display()
            )));
        }
        Ok(Self::new(templates))
    }
}

fn context(device: &Device) -> BTreeMap<String, Value> {
    let mut ctx = device.vars.clone();
    ctx.insert("inventory_hostname".to_string(), Value::from(device.name.clone()));
    ctx.insert("host".to_string(), Value::from(device.host.clone()));
    if let Some(port) = device.port {
        ctx.insert("port".to_string(), Value::from(port));
    }
    ctx
}

impl Renderer for TemplateRenderer {
    fn render(&self, device: &Device) -> Result<String, DeployError> {
        let ctx = context(device);
        let mut chunks = Vec::with_capacity(self.templates.len());
        for (name, body) in &self.templates {
            let rendered = self
                .env
                .render_named_str(name, body, &ctx)
                .map_err(|e| DeployError::RenderError(format!("{} ({}): {:#}", device.name, name, e)))?;
            let rendered = rendered.trim();
            if !rendered.is_empty() {
                chunks.push(rendered.to_string());
            }
        }
        Ok(format!("{}\n", chunks.join("\n").trim()))
    }
}

/// Render every device into `<configs_dir>/<name>.set`, one at a time
pub async fn render_all(
    renderer: &dyn Renderer,
    devices: &BTreeMap<String, Device>,
    layout: &StorageLayout,
) -> Result<BTreeMap<String, PathBuf>, DeployError> {
    layout.configs_dir().create().await?;

    let mut written = BTreeMap::new();
    for (name, device) in devices {
        let text = renderer.render(device)?;
        let file = layout.intended_file(name);
        file.write_string(&text).await?;
        written.insert(name.clone(), file.path().to_path_buf());
    }

    info!(
        "Rendered {} intended configs into {}",
        written.len(),
        layout.configs_dir().path().display()
    );
    Ok(written)
}
