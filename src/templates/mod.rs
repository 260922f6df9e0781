//! Template engine
//!
//! Tera templates for HTML pages, RSS feeds and the sitemap. The
//! templates under `templates/` are embedded into the binary; an
//! override directory may replace any of them by name.

use anyhow::{Context, Result};
use chrono::Datelike;
use rust_embed::RustEmbed;
use serde::Serialize;
use std::error::Error as StdError;
use std::fs;
use std::path::{Path, PathBuf};
use tera::{Context as TeraContext, Tera};

mod error;

pub use error::TemplateError;

#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
#[include = "*.xml"]
struct EmbeddedTemplates;

/// Template engine for rendering pages
pub struct TemplateEngine {
    tera: Tera,
    override_path: Option<PathBuf>,
}

/// Variables every page receives
#[derive(Debug, Clone, Default, Serialize)]
pub struct StandardTemplateVars {
    /// Logged-in user, absent for anonymous visitors
    pub current_user: Option<TemplateUser>,
    pub request_path: String,
    /// Current year (footer)
    pub year: i32,
}

/// Current user as seen by templates
#[derive(Debug, Clone, Serialize)]
pub struct TemplateUser {
    pub id: i64,
    pub username: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl StandardTemplateVars {
    pub fn new(request_path: impl Into<String>) -> Self {
        Self {
            current_user: None,
            request_path: request_path.into(),
            year: chrono::Utc::now().year(),
        }
    }

    pub fn with_user(mut self, user: TemplateUser) -> Self {
        self.current_user = Some(user);
        self
    }
}

impl TemplateEngine {
    /// Load the embedded templates, then any overrides
    pub fn new(override_path: Option<&Path>) -> Result<Self> {
        let mut engine = Self {
            tera: Tera::default(),
            override_path: override_path.map(Path::to_path_buf),
        };
        engine.reload_templates()?;
        Ok(engine)
    }

    /// Rebuild the template set from the embedded files and overrides
    pub fn reload_templates(&mut self) -> Result<()> {
        let mut templates: Vec<(String, String)> = Vec::new();

        for name in EmbeddedTemplates::iter() {
            let file = EmbeddedTemplates::get(&name)
                .ok_or_else(|| TemplateError::Render(format!("Missing embedded template {}", name)))?;
            let content = String::from_utf8(file.data.into_owned())
                .map_err(|_| TemplateError::Encoding(name.to_string()))?;
            templates.push((name.to_string(), content));
        }

        if let Some(dir) = &self.override_path {
            let mut overrides = Vec::new();
            collect_templates_from_dir(dir, dir, &mut overrides)?;
            for (name, content) in overrides {
                tracing::debug!("Template override: {}", name);
                templates.retain(|(existing, _)| existing != &name);
                templates.push((name, content));
            }
        }

        let mut tera = Tera::default();
        tera.add_raw_templates(templates)
            .map_err(|e| TemplateError::Render(format!("Failed to load templates: {}", describe(&e))))?;

        tracing::info!("Loaded {} templates", tera.get_template_names().count());
        self.tera = tera;
        Ok(())
    }

    /// Render a template with context
    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String> {
        self.tera.render(template, context).map_err(|e| {
            TemplateError::Render(format!("Failed to render '{}': {}", template, describe(&e))).into()
        })
    }

    /// Render a page with the standard variables added
    pub fn render_page(
        &self,
        template: &str,
        context: &TeraContext,
        standard_vars: &StandardTemplateVars,
    ) -> Result<String> {
        let mut full_context = context.clone();
        full_context.insert("current_user", &standard_vars.current_user);
        full_context.insert("request_path", &standard_vars.request_path);
        full_context.insert("year", &standard_vars.year);

        self.render(template, &full_context)
    }

    /// Render the error page, falling back to plain HTML when the error
    /// template itself fails
    pub fn render_error(&self, status: u16, message: &str, standard_vars: &StandardTemplateVars) -> String {
        let mut context = TeraContext::new();
        context.insert("status", &status);
        context.insert("message", message);

        match self.render_page("error.html", &context, standard_vars) {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("Failed to render error template: {}", e);
                simple_error_page(status, message)
            }
        }
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }
}

/// Error message including the whole source chain
fn describe(e: &tera::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        message.push_str(&format!("\n  Caused by: {}", s));
        source = s.source();
    }
    message
}

fn collect_templates_from_dir(
    base_path: &Path,
    current_path: &Path,
    templates: &mut Vec<(String, String)>,
) -> Result<()> {
    if !current_path.exists() {
        return Ok(());
    }

    for entry in fs::read_dir(current_path)? {
        let path = entry?.path();

        if path.is_dir() {
            collect_templates_from_dir(base_path, &path, templates)?;
        } else if path
            .extension()
            .map_or(false, |ext| ext == "html" || ext == "xml")
        {
            let relative_path = path
                .strip_prefix(base_path)
                .map_err(|_| TemplateError::Render("Failed to get relative path".to_string()))?;
            let name = relative_path.to_string_lossy().replace('\\', "/");
            let content =
                fs::read_to_string(&path).with_context(|| format!("Failed to read template: {:?}", path))?;
            templates.push((name, content));
        }
    }

    Ok(())
}

fn simple_error_page(status: u16, message: &str) -> String {
    let message = message
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"UTF-8\"><title>Error {status}</title></head>\n<body><h1>Error {status}</h1><p>{message}</p></body>\n</html>\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_templates_load() {
        let engine = TemplateEngine::new(None).unwrap();
        for name in [
            "base.html",
            "error.html",
            "blogapp/articles_list.html",
            "shopapp/products_list.html",
            "myauth/login.html",
            "feed.xml",
            "sitemap.xml",
        ] {
            assert!(engine.has_template(name), "missing {}", name);
        }
    }

    #[test]
    fn test_render_page_adds_standard_vars() {
        let engine = TemplateEngine::new(None).unwrap();
        let vars = StandardTemplateVars::new("/shop/").with_user(TemplateUser {
            id: 1,
            username: "alice".into(),
            is_staff: false,
            is_superuser: false,
        });

        let html = engine.render_error(404, "No product found", &vars);
        assert!(html.contains("No product found"));
        assert!(html.contains("alice"));
    }

    #[test]
    fn test_override_directory_replaces_template() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("error.html"), "custom {{ status }}").unwrap();

        let engine = TemplateEngine::new(Some(dir.path())).unwrap();
        let html = engine.render_error(403, "nope", &StandardTemplateVars::new("/"));
        assert_eq!(html, "custom 403");
    }

    #[test]
    fn test_missing_template_errors() {
        let engine = TemplateEngine::new(None).unwrap();
        assert!(engine.render("nope.html", &TeraContext::new()).is_err());
    }

    #[test]
    fn test_simple_error_page_escapes() {
        let html = simple_error_page(500, "<b>bad</b>");
        assert!(html.contains("&lt;b&gt;bad&lt;/b&gt;"));
    }
}
