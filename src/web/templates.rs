use minijinja::{Environment, Value};
use tracing::error;

pub const SHARE_TEMPLATE: &str = "share.html";

pub fn init_templates() -> Result<Environment<'static>, minijinja::Error> {
    let mut env = Environment::new();

    env.add_template(SHARE_TEMPLATE, include_str!("../../templates/share.html"))?;

    env.add_filter("json", |value: Value| {
        serde_json::to_string(&value).unwrap_or_else(|_| "null".to_string())
    });

    Ok(env)
}

/// Renders `template_name`, degrading to an inline error page.
pub fn render_template(env: &Environment, template_name: &str, context: Value) -> String {
    match env.get_template(template_name) {
        Ok(tmpl) => match tmpl.render(context) {
            Ok(result) => result,
            Err(e) => {
                error!("Template render error: {}", e);
                format!("<h1>Template Error</h1><p>{}</p>", e)
            }
        },
        Err(e) => {
            error!("Template not found: {} ({})", template_name, e);
            format!("<h1>Template Not Found</h1><p>{}: {}</p>", template_name, e)
        }
    }
}
