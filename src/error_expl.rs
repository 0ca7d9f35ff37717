use log::trace;
use smallvec::SmallVec;

use crate::span::Span;

/// Renders explanations of errors found in condition texts and other short
/// sources, underlining the spans the error refers to.
pub struct Pretty<'src> {
    src: &'src str,
}

impl<'src> Pretty<'src> {
    pub fn new(src: &'src str) -> Self {
        Self { src }
    }

    pub fn explain_builder(&self) -> ExplainBuilder<'src> {
        ExplainBuilder {
            src: self.src,
            title: None,
            error_context: None,
            explain_contexts: Default::default(),
        }
    }
}

pub struct ExplainBuilder<'src> {
    src: &'src str,
    title: Option<String>,
    error_context: Option<Context>,
    explain_contexts: SmallVec<[Context; 8]>,
}

impl<'src> ExplainBuilder<'src> {
    /// Headline printed above the source excerpt.
    pub fn title(&mut self, title: impl Into<String>) -> &mut Self {
        self.title = Some(title.into());
        self
    }

    /// Add a context with the error message.
    pub fn push_context(&mut self, context: Context) -> &mut Self {
        self.explain_contexts.push(context);
        self
    }

    /// Add an error context to the error message.
    pub fn error(&mut self, context: Context) -> &mut Self {
        self.error_context = Some(context);
        self
    }

    /// Build pretty explanation from the provided contexts.
    pub fn build(self) -> Result<PrettyError, ExplainBuildError> {
        let error = self
            .error_context
            .ok_or(ExplainBuildError::MissingErrorContext)?;

        let lines: Vec<&str> = self.src.split('\n').collect();
        let last_line = lines.len().saturating_sub(1);
        let gutter = (last_line + 1).to_string().len();

        let mut out = String::new();
        if let Some(title) = &self.title {
            out.push_str(title);
            out.push('\n');
        }

        let at = error.important.locate(self.src);
        out.push_str(&format!(
            "{:gutter$}--> line {}, column {}\n",
            "",
            at.line() + 1,
            at.col() + 1
        ));

        trace!("Render error context and {} extra", self.explain_contexts.len());
        let contexts = std::iter::once((&error, '^'))
            .chain(self.explain_contexts.iter().map(|c| (c, '-')));
        for (context, mark) in contexts {
            let span = context.important.combine(&context.additional);
            let start = span.locate(self.src);
            let line_no = (start.line() as usize).min(last_line);
            let line = lines[line_no];

            let line_len = line.chars().count() as u32;
            let start_col = start.col().min(line_len);
            let end_col = if span.end() as usize > self.src.len() {
                line_len + 1
            } else {
                let end = span.locate_end(self.src);
                if end.line() == start.line() {
                    end.col()
                } else {
                    line_len
                }
            };
            let width = end_col.saturating_sub(start_col).max(1) as usize;

            out.push_str(&format!("{:gutter$} |\n", ""));
            out.push_str(&format!("{:>gutter$} | {}\n", line_no + 1, line));
            out.push_str(&format!(
                "{:gutter$} | {}{} {}\n",
                "",
                " ".repeat(start_col as usize),
                mark.to_string().repeat(width),
                context.message
            ));
        }

        Ok(PrettyError(out.trim_end().to_owned()))
    }
}

#[derive(Debug, Clone)]
pub struct PrettyError(String);

impl std::fmt::Display for PrettyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for PrettyError {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::convert::AsRef<str> for PrettyError {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExplainBuildError {
    #[error("Error context is missing")]
    MissingErrorContext,
}

pub struct Context {
    important: Span,
    additional: Span,
    message: String,
}

#[derive(Debug, Default)]
pub struct ContextBuilder {
    important: Option<Span>,
    additional: Option<Span>,
    message: Option<String>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn important(&mut self, span: Span) -> &mut Self {
        self.important = Some(span);
        self
    }

    /// Surrounding span that is underlined together with the important one.
    pub fn additional(&mut self, span: Span) -> &mut Self {
        self.additional = Some(span);
        self
    }

    pub fn message(&mut self, message: impl Into<String>) -> &mut Self {
        self.message = Some(message.into());
        self
    }

    pub fn build(&mut self) -> Result<Context, ContextBuildError> {
        trace!("Building context");

        let important = self
            .important
            .take()
            .ok_or(ContextBuildError::MissingImportant)?;
        let additional = self.additional.take().unwrap_or(important);

        trace!("Check additional and important spans touch");
        if additional.end() < important.start() || important.end() < additional.start() {
            return Err(ContextBuildError::AdditionalNotOverlapsImportant);
        }

        let message = self.message.take().ok_or(ContextBuildError::MissingMessage)?;
        trace!("Context is built successfully");
        Ok(Context {
            important,
            additional,
            message,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContextBuildError {
    #[error("Missing important span")]
    MissingImportant,

    #[error("Missing message")]
    MissingMessage,

    #[error("Additional context span does not overlap with important context span")]
    AdditionalNotOverlapsImportant,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(span: std::ops::Range<usize>, message: &str) -> Context {
        ContextBuilder::new()
            .important(Span::from(span))
            .message(message)
            .build()
            .unwrap()
    }

    #[test]
    fn underlines_error_span() {
        crate::init_log();

        let pretty = Pretty::new("qty > )");
        let mut builder = pretty.explain_builder();
        builder.title("unexpected token").error(context(6..7, "expected a value"));
        let text = builder.build().unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "unexpected token");
        assert_eq!(lines[1], " --> line 1, column 7");
        assert_eq!(lines[3], "1 | qty > )");
        assert_eq!(lines[4], "  |       ^ expected a value");
    }

    #[test]
    fn extra_contexts_use_dashes() {
        let pretty = Pretty::new("(qty > 0");
        let mut builder = pretty.explain_builder();
        builder
            .error(context(8..8, "expected `)`"))
            .push_context(context(0..1, "opened here"));
        let text = builder.build().unwrap();
        assert!(text.contains("        ^ expected `)`"));
        assert!(text.contains("  | - opened here"));
    }

    #[test]
    fn additional_span_widens_underline() {
        let pretty = Pretty::new("qty > 'a' 'b'");
        let mut builder = pretty.explain_builder();
        let error = ContextBuilder::new()
            .important(Span::from(10..13))
            .additional(Span::from(6..13))
            .message("two literals in a row")
            .build()
            .unwrap();
        builder.error(error);
        let text = builder.build().unwrap();
        assert!(text.contains("      ^^^^^^^ two literals in a row"), "{text}");

        assert!(matches!(
            ContextBuilder::new()
                .important(Span::from(0..1))
                .additional(Span::from(5..6))
                .message("far away")
                .build(),
            Err(ContextBuildError::AdditionalNotOverlapsImportant)
        ));
    }

    #[test]
    fn missing_error_context() {
        let pretty = Pretty::new("qty");
        assert!(matches!(
            pretty.explain_builder().build(),
            Err(ExplainBuildError::MissingErrorContext)
        ));
    }

    #[test]
    fn context_requires_message() {
        let err = ContextBuilder::new().important(Span::from(0..1)).build();
        assert!(matches!(err, Err(ContextBuildError::MissingMessage)));
    }
}
