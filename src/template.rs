use std::{collections::HashMap, path::Path, sync::OnceLock};

use regex::{Captures, Regex};

/// An error while loading a template.
#[derive(thiserror::Error, Debug)]
#[error("could not read template {path:?}: {source}")]
pub struct TemplateError {
    pub path: String,
    #[source]
    pub source: std::io::Error,
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*\$([^}\s]+)\s*\}\}").expect("valid placeholder pattern")
    })
}

/// Replace every `{{ $name }}` with the value of `name`.
///
/// Unknown names render as an empty string.
pub fn render(template: &str, variables: &HashMap<String, String>) -> String {
    placeholder()
        .replace_all(template, |captures: &Captures| {
            variables
                .get(&captures[1])
                .map(String::as_str)
                .unwrap_or_default()
                .to_string()
        })
        .into_owned()
}

/// Read a template file and render it.
pub async fn load(
    path: impl AsRef<Path>,
    variables: &HashMap<String, String>,
) -> Result<String, TemplateError> {
    let path = path.as_ref();
    let template = tokio::fs::read_to_string(path).await.map_err(|source| {
        TemplateError {
            path: path.display().to_string(),
            source,
        }
    })?;
    Ok(render(&template, variables))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{load, render};

    fn variables() -> HashMap<String, String> {
        HashMap::from([
            ("name".to_string(), "Ada".to_string()),
            ("code".to_string(), "1234".to_string()),
        ])
    }

    #[test]
    fn substitutes_known_names() {
        assert_eq!(
            render("<p>Hi {{ $name }}, use {{$code}}</p>", &variables()),
            "<p>Hi Ada, use 1234</p>"
        );
    }

    #[test]
    fn unknown_names_become_empty() {
        assert_eq!(render("[{{ $missing }}]", &variables()), "[]");
    }

    #[test]
    fn leaves_other_braces_alone() {
        assert_eq!(
            render("{{ name }} { $name } {{ $name }}", &variables()),
            "{{ name }} { $name } Ada"
        );
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let error = load("/nonexistent/template.html", &variables())
            .await
            .unwrap_err();
        assert_eq!(error.path, "/nonexistent/template.html");
    }
}
