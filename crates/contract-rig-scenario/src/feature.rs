// crates/contract-rig-scenario/src/feature.rs
// ============================================================================
// Module: Feature Reader
// Description: Line-oriented reader for Given/When/Then feature files.
// Purpose: Turn authored feature text into flat, executable scenarios with
//          backgrounds prepended and outlines expanded.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Supported constructs: `Feature`, `Background` (feature and rule level),
//! `Rule`, `Scenario`/`Example`, `Scenario Outline`/`Scenario Template` with
//! one or more `Examples` blocks, tags on every level, data tables, and doc
//! strings fenced by `"""` or a triple backtick. Free text directly below a
//! header is treated as description. Everything else is a line-numbered
//! [`FeatureError::Syntax`].
//!
//! Feature input is author-controlled but still bounded by
//! [`MAX_FEATURE_BYTES`].

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum feature file size in bytes.
pub const MAX_FEATURE_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Normalized step keyword. `And`, `But` and `*` inherit the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKeyword {
    /// Precondition.
    Given,
    /// Action.
    When,
    /// Outcome.
    Then,
}

impl StepKeyword {
    /// Returns the keyword as written in feature files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Given => "Given",
            Self::When => "When",
            Self::Then => "Then",
        }
    }
}

/// One executable step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    /// Effective keyword.
    pub keyword: StepKeyword,
    /// Step text without the keyword.
    pub text: String,
    /// One-based source line.
    pub line: usize,
    /// Attached data table, row by row.
    pub table: Option<Vec<Vec<String>>>,
    /// Attached doc string.
    pub docstring: Option<String>,
}

/// A flat scenario ready to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scenario {
    /// Owning feature name.
    pub feature: String,
    /// Scenario name; outline rows carry an example suffix.
    pub name: String,
    /// Inherited and own tags without the leading `@`.
    pub tags: Vec<String>,
    /// Background steps followed by the scenario's own steps.
    pub steps: Vec<Step>,
    /// One-based line of the scenario header.
    pub line: usize,
}

/// A parsed feature file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feature {
    /// Feature name.
    pub name: String,
    /// Where the text came from.
    pub origin: String,
    /// Feature-level tags.
    pub tags: Vec<String>,
    /// Expanded scenarios in file order.
    pub scenarios: Vec<Scenario>,
}

/// Feature reading failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeatureError {
    /// Input exceeded [`MAX_FEATURE_BYTES`].
    #[error("{origin}: feature exceeds {max_bytes} bytes ({actual_bytes})")]
    InputTooLarge {
        /// Source of the text.
        origin: String,
        /// Limit.
        max_bytes: usize,
        /// Actual size.
        actual_bytes: usize,
    },
    /// Malformed feature text.
    #[error("{origin}:{line}: {message}")]
    Syntax {
        /// Source of the text.
        origin: String,
        /// One-based line number.
        line: usize,
        /// What went wrong.
        message: String,
    },
    /// A feature file or directory could not be read.
    #[error("cannot read {path}: {message}")]
    Io {
        /// Path that failed.
        path: String,
        /// IO message.
        message: String,
    },
}

// ============================================================================
// SECTION: Parser State
// ============================================================================

/// Where the next step line goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepTarget {
    /// Before any scenario or background.
    None,
    /// The feature-level background.
    FeatureBackground,
    /// The background of the current rule.
    RuleBackground,
    /// The scenario being parsed.
    Draft,
    /// An examples table; steps are not allowed.
    Examples,
}

/// One `Examples:` table of an outline.
#[derive(Debug, Default)]
struct ExamplesBlock {
    /// Tags on the examples block.
    tags: Vec<String>,
    /// Column names from the first row.
    header: Option<Vec<String>>,
    /// Remaining rows.
    rows: Vec<Vec<String>>,
    /// Line of the `Examples:` keyword.
    line: usize,
}

/// Scenario or outline under construction.
#[derive(Debug)]
struct Draft {
    /// Scenario name.
    name: String,
    /// Own tags, without inherited ones.
    tags: Vec<String>,
    /// Own steps, without backgrounds.
    steps: Vec<Step>,
    /// Line of the scenario keyword.
    line: usize,
    /// True for `Scenario Outline:`.
    outline: bool,
    /// Examples tables of an outline.
    examples: Vec<ExamplesBlock>,
}

/// Open doc string.
struct DocString {
    /// Delimiter that closes it.
    fence: &'static str,
    /// Leading whitespace characters on the opening fence.
    indent: usize,
    /// Body lines collected so far.
    lines: Vec<String>,
    /// Line of the opening fence.
    line: usize,
}

/// Line-oriented Gherkin parser state.
struct Parser<'a> {
    /// Label used in errors.
    origin: &'a str,
    /// Feature name and tags, once seen.
    feature: Option<(String, Vec<String>)>,
    /// Steps of the feature background.
    feature_background: Vec<Step>,
    /// True after a `Rule:` keyword.
    in_rule: bool,
    /// Tags of the current rule.
    rule_tags: Vec<String>,
    /// Steps of the current rule background.
    rule_background: Vec<Step>,
    /// Tags waiting for the next keyword.
    pending_tags: Vec<String>,
    /// Where the next step goes.
    target: StepTarget,
    /// Scenario under construction.
    draft: Option<Draft>,
    /// Keyword that `And` and `But` inherit.
    last_keyword: Option<StepKeyword>,
    /// True while free text after a header is still description.
    description_allowed: bool,
    /// Open doc string.
    docstring: Option<DocString>,
    /// Finished scenarios.
    scenarios: Vec<Scenario>,
}

// ============================================================================
// SECTION: Public API
// ============================================================================

/// Parses one feature from `text`; `origin` labels errors.
///
/// # Errors
///
/// Returns [`FeatureError`] when the text is too large or malformed.
pub fn parse_feature(text: &str, origin: &str) -> Result<Feature, FeatureError> {
    if text.len() > MAX_FEATURE_BYTES {
        return Err(FeatureError::InputTooLarge {
            origin: origin.to_string(),
            max_bytes: MAX_FEATURE_BYTES,
            actual_bytes: text.len(),
        });
    }
    let mut parser = Parser::new(origin);
    for (index, raw) in text.lines().enumerate() {
        parser.line(index + 1, raw)?;
    }
    parser.finish(text.lines().count())
}

/// Loads every `.feature` file under `path` (recursively, sorted by path), or
/// the single file `path` names.
///
/// # Errors
///
/// Returns [`FeatureError`] when a file cannot be read or parsed.
pub fn load_features(path: &Path) -> Result<Vec<Feature>, FeatureError> {
    let mut files = Vec::new();
    if path.is_file() {
        files.push(path.to_path_buf());
    } else {
        collect_feature_files(path, &mut files)?;
        files.sort();
    }
    files
        .iter()
        .map(|file| {
            let text = fs::read_to_string(file).map_err(|err| io_error(file, &err))?;
            parse_feature(&text, &file.display().to_string())
        })
        .collect()
}

/// Collects `.feature` files under `dir` recursively.
fn collect_feature_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), FeatureError> {
    let entries = fs::read_dir(dir).map_err(|err| io_error(dir, &err))?;
    for entry in entries {
        let path = entry.map_err(|err| io_error(dir, &err))?.path();
        if path.is_dir() {
            collect_feature_files(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "feature") {
            files.push(path);
        }
    }
    Ok(())
}

/// Wraps an IO failure with its path.
fn io_error(path: &Path, err: &std::io::Error) -> FeatureError {
    FeatureError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

// ============================================================================
// SECTION: Line Handling
// ============================================================================

/// Step keywords; `None` inherits the previous keyword.
const STEP_PREFIXES: [(&str, Option<StepKeyword>); 6] = [
    ("Given ", Some(StepKeyword::Given)),
    ("When ", Some(StepKeyword::When)),
    ("Then ", Some(StepKeyword::Then)),
    ("And ", None),
    ("But ", None),
    ("* ", None),
];

impl<'a> Parser<'a> {
    /// Creates a parser for one file.
    const fn new(origin: &'a str) -> Self {
        Self {
            origin,
            feature: None,
            feature_background: Vec::new(),
            in_rule: false,
            rule_tags: Vec::new(),
            rule_background: Vec::new(),
            pending_tags: Vec::new(),
            target: StepTarget::None,
            draft: None,
            last_keyword: None,
            description_allowed: false,
            docstring: None,
            scenarios: Vec::new(),
        }
    }

    /// Syntax error at `line`.
    fn syntax(&self, line: usize, message: impl Into<String>) -> FeatureError {
        syntax_error(self.origin, line, message)
    }

    /// Dispatches one source line.
    fn line(&mut self, number: usize, raw: &str) -> Result<(), FeatureError> {
        if self.docstring.is_some() {
            return self.docstring_line(number, raw);
        }
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }
        if line.starts_with('@') {
            return self.tag_line(number, line);
        }
        if let Some(rest) = line.strip_prefix("Feature:") {
            return self.feature_header(number, rest);
        }
        if self.feature.is_none() {
            return Err(self.syntax(number, "expected `Feature:` before any other content"));
        }
        if line.starts_with("Background:") {
            return self.background_header(number);
        }
        if line.strip_prefix("Rule:").is_some() {
            self.finish_draft()?;
            self.in_rule = true;
            self.rule_tags = std::mem::take(&mut self.pending_tags);
            self.rule_background.clear();
            self.target = StepTarget::None;
            self.description_allowed = true;
            return Ok(());
        }
        for prefix in ["Scenario Outline:", "Scenario Template:"] {
            if let Some(rest) = line.strip_prefix(prefix) {
                return self.scenario_header(number, rest, true);
            }
        }
        for prefix in ["Examples:", "Scenarios:"] {
            if line.starts_with(prefix) {
                return self.examples_header(number);
            }
        }
        for prefix in ["Scenario:", "Example:"] {
            if let Some(rest) = line.strip_prefix(prefix) {
                return self.scenario_header(number, rest, false);
            }
        }
        if line.starts_with('|') {
            return self.table_line(number, line);
        }
        if line.starts_with("\"\"\"") || line.starts_with("```") {
            return self.open_docstring(number, raw);
        }
        if let Some((keyword, text)) = self.step_keyword(line) {
            return self.step_line(number, keyword, text);
        }
        if self.description_allowed {
            return Ok(());
        }
        Err(self.syntax(number, format!("unexpected line `{line}`")))
    }

    /// Collects tags for the next keyword.
    fn tag_line(&mut self, number: usize, line: &str) -> Result<(), FeatureError> {
        let content = line.split(" #").next().unwrap_or(line);
        for token in content.split_whitespace() {
            let Some(tag) = token.strip_prefix('@').filter(|tag| !tag.is_empty()) else {
                return Err(self.syntax(number, format!("malformed tag `{token}`")));
            };
            self.pending_tags.push(tag.to_string());
        }
        self.description_allowed = false;
        Ok(())
    }

    /// Handles `Feature:`.
    fn feature_header(&mut self, number: usize, rest: &str) -> Result<(), FeatureError> {
        if self.feature.is_some() {
            return Err(self.syntax(number, "only one `Feature:` per file"));
        }
        self.feature = Some((rest.trim().to_string(), std::mem::take(&mut self.pending_tags)));
        self.target = StepTarget::None;
        self.description_allowed = true;
        Ok(())
    }

    /// Handles `Background:` at feature or rule level.
    fn background_header(&mut self, number: usize) -> Result<(), FeatureError> {
        self.finish_draft()?;
        if !self.pending_tags.is_empty() {
            return Err(self.syntax(number, "backgrounds cannot be tagged"));
        }
        self.target = if self.in_rule {
            StepTarget::RuleBackground
        } else {
            StepTarget::FeatureBackground
        };
        self.last_keyword = None;
        self.description_allowed = true;
        Ok(())
    }

    /// Handles `Scenario:` and `Scenario Outline:`.
    fn scenario_header(&mut self, number: usize, rest: &str, outline: bool) -> Result<(), FeatureError> {
        self.finish_draft()?;
        self.draft = Some(Draft {
            name: rest.trim().to_string(),
            tags: std::mem::take(&mut self.pending_tags),
            steps: Vec::new(),
            line: number,
            outline,
            examples: Vec::new(),
        });
        self.target = StepTarget::Draft;
        self.last_keyword = None;
        self.description_allowed = true;
        Ok(())
    }

    /// Handles `Examples:` inside an outline.
    fn examples_header(&mut self, number: usize) -> Result<(), FeatureError> {
        let tags = std::mem::take(&mut self.pending_tags);
        let origin = self.origin;
        let Some(draft) = self.draft.as_mut().filter(|draft| draft.outline) else {
            return Err(syntax_error(origin, number, "`Examples:` outside a scenario outline"));
        };
        draft.examples.push(ExamplesBlock {
            tags,
            line: number,
            ..ExamplesBlock::default()
        });
        self.target = StepTarget::Examples;
        self.description_allowed = true;
        Ok(())
    }

    /// Splits a step line into keyword and text.
    fn step_keyword<'l>(&self, line: &'l str) -> Option<(StepKeyword, &'l str)> {
        STEP_PREFIXES.iter().find_map(|&(prefix, keyword)| {
            let text = line.strip_prefix(prefix)?;
            let keyword = keyword.or(self.last_keyword).unwrap_or(StepKeyword::Given);
            Some((keyword, text.trim()))
        })
    }

    /// Appends a step to the current target.
    fn step_line(&mut self, number: usize, keyword: StepKeyword, text: &str) -> Result<(), FeatureError> {
        let step = Step {
            keyword,
            text: text.to_string(),
            line: number,
            table: None,
            docstring: None,
        };
        let origin = self.origin;
        let steps = match self.target {
            StepTarget::FeatureBackground => &mut self.feature_background,
            StepTarget::RuleBackground => &mut self.rule_background,
            StepTarget::Draft => match self.draft.as_mut() {
                Some(draft) => &mut draft.steps,
                None => return Err(syntax_error(origin, number, "step outside a scenario")),
            },
            StepTarget::None | StepTarget::Examples => {
                return Err(syntax_error(origin, number, "step outside a scenario or background"));
            }
        };
        steps.push(step);
        self.last_keyword = Some(keyword);
        self.description_allowed = false;
        Ok(())
    }

    /// Most recent step of the current target.
    fn last_step(&mut self) -> Option<&mut Step> {
        match self.target {
            StepTarget::FeatureBackground => self.feature_background.last_mut(),
            StepTarget::RuleBackground => self.rule_background.last_mut(),
            StepTarget::Draft => self.draft.as_mut().and_then(|draft| draft.steps.last_mut()),
            StepTarget::None | StepTarget::Examples => None,
        }
    }

    /// Adds a table row to the last step or the examples block.
    fn table_line(&mut self, number: usize, line: &str) -> Result<(), FeatureError> {
        let cells = parse_row(line);
        self.description_allowed = false;
        let origin = self.origin;
        if self.target == StepTarget::Examples {
            let block = self
                .draft
                .as_mut()
                .and_then(|draft| draft.examples.last_mut())
                .ok_or_else(|| syntax_error(origin, number, "table row outside an examples block"))?;
            if block.header.is_none() {
                block.header = Some(cells);
            } else {
                block.rows.push(cells);
            }
            return Ok(());
        }
        match self.last_step() {
            Some(step) => {
                step.table.get_or_insert_with(Vec::new).push(cells);
                Ok(())
            }
            None => Err(syntax_error(origin, number, "table row without a preceding step")),
        }
    }

    /// Opens a doc string on the last step.
    fn open_docstring(&mut self, number: usize, raw: &str) -> Result<(), FeatureError> {
        if self.last_step().is_none() {
            return Err(self.syntax(number, "doc string without a preceding step"));
        }
        let trimmed = raw.trim_start();
        let fence = if trimmed.starts_with("```") { "```" } else { "\"\"\"" };
        self.docstring = Some(DocString {
            fence,
            indent: raw.chars().take_while(|ch| ch.is_whitespace()).count(),
            lines: Vec::new(),
            line: number,
        });
        Ok(())
    }

    /// Adds a body line, or closes the doc string on its fence.
    fn docstring_line(&mut self, _number: usize, raw: &str) -> Result<(), FeatureError> {
        let Some(doc) = self.docstring.as_mut() else {
            return Ok(());
        };
        if raw.trim() == doc.fence {
            let text = doc.lines.join("\n");
            self.docstring = None;
            if let Some(step) = self.last_step() {
                step.docstring = Some(text);
            }
            return Ok(());
        }
        let cut = raw
            .char_indices()
            .take_while(|(_, ch)| ch.is_whitespace())
            .take(doc.indent)
            .last()
            .map_or(0, |(at, ch)| at + ch.len_utf8());
        doc.lines.push(raw.get(cut ..).unwrap_or(raw).to_string());
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Finishing
    // ------------------------------------------------------------------------

    /// Turns the draft into scenarios, expanding outlines.
    fn finish_draft(&mut self) -> Result<(), FeatureError> {
        let Some(draft) = self.draft.take() else {
            return Ok(());
        };
        let feature_name = self.feature.as_ref().map(|(name, _)| name.clone()).unwrap_or_default();
        let mut inherited = self.feature.as_ref().map(|(_, tags)| tags.clone()).unwrap_or_default();
        inherited.extend(self.rule_tags.iter().cloned());
        let mut background = self.feature_background.clone();
        background.extend(self.rule_background.iter().cloned());

        if !draft.outline {
            self.scenarios.push(Scenario {
                feature: feature_name,
                name: draft.name,
                tags: merge_tags(&inherited, &draft.tags, &[]),
                steps: background.into_iter().chain(draft.steps).collect(),
                line: draft.line,
            });
            return Ok(());
        }
        if draft.examples.is_empty() {
            return Err(self.syntax(draft.line, "scenario outline without `Examples:`"));
        }
        let mut ordinal = 0;
        for block in &draft.examples {
            let Some(header) = &block.header else {
                return Err(self.syntax(block.line, "examples block without a header row"));
            };
            for row in &block.rows {
                if row.len() != header.len() {
                    return Err(self.syntax(
                        block.line,
                        format!("examples row has {} cells, header has {}", row.len(), header.len()),
                    ));
                }
                ordinal += 1;
                let bindings: Vec<(String, &str)> =
                    header.iter().zip(row).map(|(name, value)| (format!("<{name}>"), value.as_str())).collect();
                let steps = draft.steps.iter().map(|step| expand_step(step, &bindings));
                self.scenarios.push(Scenario {
                    feature: feature_name.clone(),
                    name: format!("{} (example {ordinal})", draft.name),
                    tags: merge_tags(&inherited, &draft.tags, &block.tags),
                    steps: background.iter().cloned().chain(steps).collect(),
                    line: draft.line,
                });
            }
        }
        Ok(())
    }

    /// Closes the file and returns the feature.
    fn finish(mut self, last_line: usize) -> Result<Feature, FeatureError> {
        if let Some(doc) = &self.docstring {
            return Err(self.syntax(doc.line, "unterminated doc string"));
        }
        self.finish_draft()?;
        let Some((name, tags)) = self.feature.take() else {
            return Err(self.syntax(last_line.max(1), "missing `Feature:` header"));
        };
        Ok(Feature {
            name,
            origin: self.origin.to_string(),
            tags,
            scenarios: self.scenarios,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a syntax error.
fn syntax_error(origin: &str, line: usize, message: impl Into<String>) -> FeatureError {
    FeatureError::Syntax {
        origin: origin.to_string(),
        line,
        message: message.into(),
    }
}

/// Splits a `| a | b |` row into trimmed cells.
fn parse_row(line: &str) -> Vec<String> {
    let inner = line.trim().trim_start_matches('|');
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').map(|cell| cell.trim().replace("\\n", "\n")).collect()
}

/// Feature, rule, scenario and examples tags without duplicates.
fn merge_tags(inherited: &[String], own: &[String], examples: &[String]) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in inherited.iter().chain(own).chain(examples) {
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }
    tags
}

/// Replaces `<name>` with the bound example values.
fn substitute_outline(text: &str, bindings: &[(String, &str)]) -> String {
    bindings.iter().fold(text.to_string(), |acc, (token, value)| acc.replace(token.as_str(), value))
}

/// Substitutes example values in the step text and its arguments.
fn expand_step(step: &Step, bindings: &[(String, &str)]) -> Step {
    Step {
        keyword: step.keyword,
        text: substitute_outline(&step.text, bindings),
        line: step.line,
        table: step.table.as_ref().map(|rows| {
            rows.iter()
                .map(|row| row.iter().map(|cell| substitute_outline(cell, bindings)).collect())
                .collect()
        }),
        docstring: step.docstring.as_ref().map(|doc| substitute_outline(doc, bindings)),
    }
}
