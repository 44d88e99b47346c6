//! Interpolation of user supplied `qemuargs` values.
//!
//! Override values may reference build facts using Go template syntax, e.g.
//! `-netdev user,id=mynet,hostfwd=tcp::{{ .SSHHostPort }}-:22`. The renderer
//! is behind the [`TemplateRenderer`] trait; [`FieldRenderer`] handles plain
//! `{{ .Field }}` references, which is what override rows use in practice.

use thiserror::Error;

/// Values exposed to override templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterpolationContext {
    pub http_ip: String,
    pub http_port: u16,
    pub http_dir: String,
    pub output_dir: String,
    pub name: String,
    /// Forwarded communicator port; zero when no communicator is configured
    pub ssh_host_port: u16,
}

impl InterpolationContext {
    /// Look up a template field by its exported name.
    pub fn field(&self, name: &str) -> Option<String> {
        let v = match name {
            "HTTPIP" => self.http_ip.clone(),
            "HTTPPort" => self.http_port.to_string(),
            "HTTPDir" => self.http_dir.clone(),
            "OutputDir" => self.output_dir.clone(),
            "Name" => self.name.clone(),
            "SSHHostPort" => self.ssh_host_port.to_string(),
            _ => return None,
        };
        Some(v)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated action starting at byte {0}")]
    Unterminated(usize),
    #[error("unsupported action '{0}'")]
    UnsupportedAction(String),
    #[error("unknown field '.{0}'")]
    UnknownField(String),
}

pub trait TemplateRenderer {
    fn render(&self, template: &str, ctx: &InterpolationContext) -> Result<String, TemplateError>;
}

/// Renders literal text and `{{ .Field }}` references.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldRenderer;

impl TemplateRenderer for FieldRenderer {
    fn render(&self, template: &str, ctx: &InterpolationContext) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after_open = &rest[start + 2..];
            let end = after_open
                .find("}}")
                .ok_or(TemplateError::Unterminated(offset + start))?;

            let action = after_open[..end].trim();
            let field = action
                .strip_prefix('.')
                .filter(|f| !f.is_empty() && f.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
                .ok_or_else(|| TemplateError::UnsupportedAction(action.to_owned()))?;
            let value = ctx
                .field(field)
                .ok_or_else(|| TemplateError::UnknownField(field.to_owned()))?;
            out.push_str(&value);

            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        out.push_str(rest);
        Ok(out)
    }
}
