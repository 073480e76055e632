use regex::{Regex, RegexBuilder};

/// Path or URL template with per-axis tile placeholders, matched
/// case-insensitively (`{z}`/`{Z}`, `{TileRow}`/`{tilerow}`, ...).
#[derive(Clone, Debug)]
pub struct TileUrlTemplate {
    template: String,
    z: Regex,
    x: Regex,
    y: Regex,
}

#[derive(thiserror::Error, Debug)]
#[error("Template {template:?} is missing the {{{placeholder}}} placeholder")]
pub struct TemplateError {
    pub template: String,
    pub placeholder: &'static str,
}

fn placeholder_regex(name: &str) -> Regex {
    RegexBuilder::new(&format!(r"\{{{name}\}}"))
        .case_insensitive(true)
        .build()
        .expect("static placeholder pattern")
}

impl TileUrlTemplate {
    /// `{z}`/`{x}`/`{y}` template used by `file`, `xyz`, and `tms` sources.
    pub fn xyz(template: &str) -> Result<Self, TemplateError> {
        Self::with_names(template, "z", "x", "y")
    }

    /// `{TileMatrix}`/`{TileCol}`/`{TileRow}` template used by WMTS sources.
    pub fn wmts(template: &str) -> Result<Self, TemplateError> {
        Self::with_names(template, "tilematrix", "tilecol", "tilerow")
    }

    fn with_names(
        template: &str,
        z_name: &'static str,
        x_name: &'static str,
        y_name: &'static str,
    ) -> Result<Self, TemplateError> {
        let (z, x, y) = (
            placeholder_regex(z_name),
            placeholder_regex(x_name),
            placeholder_regex(y_name),
        );
        for (re, placeholder) in [(&z, z_name), (&x, x_name), (&y, y_name)] {
            if !re.is_match(template) {
                return Err(TemplateError {
                    template: template.to_string(),
                    placeholder,
                });
            }
        }
        Ok(Self {
            template: template.to_string(),
            z,
            x,
            y,
        })
    }

    /// Substitutes all placeholder occurrences. The row value is whatever the
    /// caller's axis convention requires; no flipping happens here.
    #[must_use]
    pub fn fill(&self, z: u8, x: u32, y: u32) -> String {
        let out = self.z.replace_all(&self.template, z.to_string());
        let out = self.x.replace_all(&out, x.to_string());
        self.y.replace_all(&out, y.to_string()).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_mixed_case_placeholders() {
        let t = TileUrlTemplate::xyz("/tiles/{Z}/{x}/{Y}.png").unwrap();
        assert_eq!(t.fill(3, 5, 2), "/tiles/3/5/2.png");
    }

    #[test]
    fn fills_wmts_placeholders() {
        let t = TileUrlTemplate::wmts(
            "https://example.com/wmts/roads/default/grid/{TileMatrix}/{TileRow}/{TileCol}.png",
        )
        .unwrap();
        assert_eq!(
            t.fill(7, 10, 20),
            "https://example.com/wmts/roads/default/grid/7/20/10.png"
        );
    }

    #[test]
    fn rejects_missing_placeholder() {
        let err = TileUrlTemplate::xyz("/tiles/{z}/{x}.png").unwrap_err();
        assert_eq!(err.placeholder, "y");
    }
}
