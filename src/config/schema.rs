use crate::rule::{Guard, PatchRule, Scope};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

fn default_true() -> bool {
    true
}

fn default_backup_suffix() -> String {
    ".orig".to_string()
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchManifest {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub targets: Vec<TargetDefinition>,
}

impl PatchManifest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.targets.is_empty() {
            issues.push(ValidationIssue::EmptyTargetList);
        }

        if self.meta.backup_suffix.trim().is_empty() {
            issues.push(ValidationIssue::InvalidCombo {
                file: None,
                message: "meta.backup_suffix must not be empty".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            if target.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    file: None,
                    field: "file",
                });
                continue;
            }
            if !seen.insert(target.file.as_str()) {
                issues.push(ValidationIssue::DuplicateTarget {
                    file: target.file.clone(),
                });
            }

            for (index, rule) in target.rules.iter().enumerate() {
                rule.validate_into(&target.file, index, &mut issues);
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Resolve target files against the workspace root (and guard them)
    #[serde(default = "default_true")]
    pub workspace_relative: bool,
    /// Suffix for pre-patch copies written by `apply --backup`
    #[serde(default = "default_backup_suffix")]
    pub backup_suffix: String,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: None,
            workspace_relative: true,
            backup_suffix: default_backup_suffix(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TargetDefinition {
    pub file: String,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

impl TargetDefinition {
    /// Compile this target's rules in declaration order.
    ///
    /// Manifests loaded through the loader are already validated, so this
    /// only fails for hand-built definitions.
    pub fn compile_rules(&self) -> Result<Vec<PatchRule>, RuleCompileError> {
        self.rules
            .iter()
            .enumerate()
            .map(|(index, rule)| {
                rule.compile().map_err(|message| RuleCompileError {
                    file: self.file.clone(),
                    index,
                    message,
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    Literal,
    Regex,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::Literal => write!(f, "literal"),
            RuleKind::Regex => write!(f, "regex"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RuleDefinition {
    #[serde(rename = "type")]
    pub kind: RuleKind,
    /// Literal rules: exact substring
    #[serde(default)]
    pub search: Option<String>,
    /// Regex rules: pattern
    #[serde(default)]
    pub pattern: Option<String>,
    pub replace: String,
    /// Regex rules only
    #[serde(default)]
    pub scope: Option<Scope>,
    #[serde(default)]
    pub unless_contains: Vec<String>,
    #[serde(default)]
    pub only_if_contains: Vec<String>,
}

impl RuleDefinition {
    fn validate_into(&self, file: &str, index: usize, issues: &mut Vec<ValidationIssue>) {
        let file = Some(file.to_string());
        match self.kind {
            RuleKind::Literal => {
                if self.search.as_deref().unwrap_or("").is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        file: file.clone(),
                        field: "rules.search",
                    });
                }
                if self.pattern.is_some() {
                    issues.push(ValidationIssue::InvalidCombo {
                        file: file.clone(),
                        message: format!("rule {index}: literal rule cannot have a pattern"),
                    });
                }
                if self.scope == Some(Scope::First) {
                    issues.push(ValidationIssue::InvalidCombo {
                        file,
                        message: format!(
                            "rule {index}: scope = \"first\" is only supported on regex rules"
                        ),
                    });
                }
            }
            RuleKind::Regex => {
                match self.pattern.as_deref() {
                    None | Some("") => issues.push(ValidationIssue::MissingField {
                        file: file.clone(),
                        field: "rules.pattern",
                    }),
                    Some(pattern) => {
                        if let Err(e) = Regex::new(pattern) {
                            issues.push(ValidationIssue::InvalidRegex {
                                file: file.clone().unwrap_or_default(),
                                index,
                                message: e.to_string(),
                            });
                        }
                    }
                }
                if self.search.is_some() {
                    issues.push(ValidationIssue::InvalidCombo {
                        file,
                        message: format!("rule {index}: regex rule cannot have a search string"),
                    });
                }
            }
        }
    }

    /// Build the runtime rule.
    pub fn compile(&self) -> Result<PatchRule, String> {
        let guard = Guard {
            unless_contains: self.unless_contains.clone(),
            only_if_contains: self.only_if_contains.clone(),
        };

        let rule = match self.kind {
            RuleKind::Literal => {
                let search = self
                    .search
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| "literal rule requires a non-empty search".to_string())?;
                PatchRule::literal(search, self.replace.clone())
            }
            RuleKind::Regex => {
                let pattern = self
                    .pattern
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| "regex rule requires a pattern".to_string())?;
                PatchRule::regex(pattern, self.replace.clone(), self.scope.unwrap_or_default())
                    .map_err(|e| e.to_string())?
            }
        };

        Ok(rule.with_guard(guard))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleCompileError {
    pub file: String,
    pub index: usize,
    pub message: String,
}

impl fmt::Display for RuleCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rule {}: {}", self.file, self.index, self.message)
    }
}

impl std::error::Error for RuleCompileError {}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyTargetList,
    MissingField {
        file: Option<String>,
        field: &'static str,
    },
    InvalidCombo {
        file: Option<String>,
        message: String,
    },
    InvalidRegex {
        file: String,
        index: usize,
        message: String,
    },
    DuplicateTarget {
        file: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyTargetList => write!(f, "patch manifest contains no targets"),
            ValidationIssue::MissingField { file, field } => match file {
                Some(file) => write!(f, "target '{file}' missing required field '{field}'"),
                None => write!(f, "target missing required field '{field}'"),
            },
            ValidationIssue::InvalidCombo { file, message } => match file {
                Some(file) => write!(f, "target '{file}' has invalid configuration: {message}"),
                None => write!(f, "invalid manifest configuration: {message}"),
            },
            ValidationIssue::InvalidRegex {
                file,
                index,
                message,
            } => write!(f, "target '{file}' rule {index} has an invalid regex: {message}"),
            ValidationIssue::DuplicateTarget { file } => {
                write!(f, "target '{file}' is listed more than once")
            }
        }
    }
}
