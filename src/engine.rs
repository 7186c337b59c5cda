use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

/// TemplateEngine wraps minijinja::Environment and renders the embedded
/// artifact skeletons.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    /// Creates a new TemplateEngine with default configuration.
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        // Generated files end with a newline like hand-written ones.
        env.set_keep_trailing_newline(true);

        env.add_filter("pascalcase", crate::filters::filter_pascalcase);
        env.add_filter("slash_path", crate::filters::filter_slash_path);
        env.add_filter("module_path", crate::filters::filter_module_path);

        Self { env }
    }

    /// Renders a template string with the given context.
    pub fn render_string<T: Serialize>(
        &self,
        template_str: &str,
        context: &T,
    ) -> Result<String, String> {
        let template = self
            .env
            .template_from_str(template_str)
            .map_err(|e| e.to_string())?;

        template.render(context).map_err(|e| {
            if let Some(line) = e.line() {
                let error_line = template_str.lines().nth(line - 1).unwrap_or("");
                format!("{}\n{}", e, error_line)
            } else {
                format!("{}", e)
            }
        })
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}
