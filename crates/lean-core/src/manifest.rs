//! Manifest and dependency-descriptor grammar.
//!
//! One requirement per line:
//!
//! ```text
//! [GCC12.3.0]
//! # comment
//! zlib==1.3
//! opencv: copy bin/*.dll to ./, copy include to third_party/include
//! move lib/*.a to lib
//! https://git.example.com/tools/build.git
//! ```
//!
//! Remote `dep_tree/*.dep` descriptors use the same grammar.

use std::path::Path;
use std::sync::LazyLock;

use lean_schema::{
    DependencyDirective, DirectiveCommand, PackageName, PackageRequirement, ToolchainTag, Version,
};
use regex::Regex;
use thiserror::Error;

/// Marker stripped from every line before parsing.
pub const IGNORE_MARKER: &str = "IGNORE_IN_DEPENDENCY";

static TOOLCHAIN_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\[(VS\d+|GCC[\d.]+)\]$").expect("toolchain tag pattern is valid")
});

static DIRECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<command>\w+)\s+(?P<source>.+?)\s+to\s+(?P<destination>\S+)")
        .expect("directive pattern is valid")
});

/// A line that was skipped while parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestWarning {
    /// A requirement whose pinned version does not parse.
    #[error("line {line}: invalid version '{version}' for '{name}', skipped")]
    InvalidVersion {
        /// 1-based line number.
        line: usize,
        /// Package name as written.
        name: String,
        /// The rejected version text.
        version: String,
    },

    /// A requirement whose name contains forbidden characters.
    #[error("line {line}: invalid package name '{name}', skipped")]
    InvalidName {
        /// 1-based line number.
        line: usize,
        /// The rejected name.
        name: String,
    },

    /// A placement line that is not `<command> <source> to <destination>`.
    #[error("line {line}: unrecognized directive '{text}'")]
    InvalidDirective {
        /// 1-based line number.
        line: usize,
        /// The line as written.
        text: String,
    },
}

/// Error for a single `name[==version]` argument.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequirementParseError {
    /// The name part is empty or contains forbidden characters.
    #[error("Invalid package name '{0}'")]
    InvalidName(String),

    /// The text after `==` is not a valid version.
    #[error("Invalid version '{version}' for '{name}'")]
    InvalidVersion {
        /// Package name as written.
        name: String,
        /// The rejected version text.
        version: String,
    },
}

/// Everything a single manifest or descriptor declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedManifest {
    /// Toolchain from a leading `[TAG]` line.
    pub toolchain: Option<ToolchainTag>,
    /// Requirements in declaration order, without duplicates.
    pub requirements: Vec<PackageRequirement>,
    /// Directives paired with the requirement they belong to.
    pub directives: Vec<(PackageRequirement, DependencyDirective)>,
    /// Source-control URLs found in the file.
    pub source_refs: Vec<String>,
    /// Skipped lines.
    pub warnings: Vec<ManifestWarning>,
}

/// Match a `[VS2019]` / `[GCC12.3.0]` line.
pub fn parse_toolchain_tag(line: &str) -> Option<ToolchainTag> {
    let caps = TOOLCHAIN_TAG_RE.captures(line.trim())?;
    ToolchainTag::new(caps.get(1)?.as_str()).ok()
}

/// Parse a `copy <glob> to <dest>` / `move <glob> to <dest>` instruction.
pub fn parse_directive(text: &str) -> Option<DependencyDirective> {
    let caps = DIRECTIVE_RE.captures(text.trim())?;
    Some(DependencyDirective {
        command: DirectiveCommand::parse(&caps["command"])?,
        source_glob: caps["source"].to_string(),
        destination: caps["destination"].to_string(),
    })
}

/// Parse a `name[==version]` argument.
///
/// # Errors
///
/// Returns [`RequirementParseError`] when the name or version is invalid.
pub fn parse_requirement(text: &str) -> Result<PackageRequirement, RequirementParseError> {
    let (name, version) = match text.split_once("==") {
        Some((name, version)) => (name.trim(), Some(version.trim())),
        None => (text.trim(), None),
    };
    let name =
        PackageName::new(name).map_err(|_| RequirementParseError::InvalidName(name.to_string()))?;
    let version = version
        .map(|v| {
            Version::parse(v).map_err(|_| RequirementParseError::InvalidVersion {
                name: name.to_string(),
                version: v.to_string(),
            })
        })
        .transpose()?;
    Ok(PackageRequirement::new(name, version))
}

fn is_source_ref(line: &str) -> bool {
    line.starts_with("http://") || line.starts_with("https://") || line.ends_with(".git")
}

fn is_standalone_directive(line: &str) -> bool {
    let lower = line.get(..5).map(str::to_ascii_lowercase);
    matches!(lower.as_deref(), Some("copy " | "move "))
}

/// Strip comments and the ignore marker. Returns `None` for blank lines.
fn clean_line(raw: &str) -> Option<String> {
    let line = raw.split_once('#').map_or(raw, |(before, _)| before);
    let line = line.replace(IGNORE_MARKER, "");
    let line = line.trim();
    (!line.is_empty()).then(|| line.to_string())
}

/// Parse manifest text.
pub fn parse_manifest(text: &str) -> ParsedManifest {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut parsed = ParsedManifest::default();
    let mut context: Option<PackageRequirement> = None;
    let mut first_significant = true;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let Some(line) = clean_line(raw) else {
            continue;
        };
        let line = line.as_str();

        let is_first = std::mem::replace(&mut first_significant, false);

        if line.starts_with('[') {
            if is_first {
                parsed.toolchain = parse_toolchain_tag(line);
            }
            continue;
        }

        if is_source_ref(line) {
            if !parsed.source_refs.iter().any(|r| r == line) {
                parsed.source_refs.push(line.to_string());
            }
            continue;
        }

        if is_standalone_directive(line) {
            let Some(owner) = &context else {
                continue;
            };
            match parse_directive(line) {
                Some(directive) => parsed.directives.push((owner.clone(), directive)),
                None => parsed.warnings.push(ManifestWarning::InvalidDirective {
                    line: line_no,
                    text: line.to_string(),
                }),
            }
            continue;
        }

        let (spec, commands) = match line.split_once(':') {
            Some((spec, commands)) => (spec.trim(), Some(commands.trim())),
            None => (line, None),
        };

        let requirement = match parse_requirement(spec) {
            Ok(req) => req,
            Err(RequirementParseError::InvalidName(name)) => {
                parsed.warnings.push(ManifestWarning::InvalidName {
                    line: line_no,
                    name,
                });
                context = None;
                continue;
            }
            Err(RequirementParseError::InvalidVersion { name, version }) => {
                parsed.warnings.push(ManifestWarning::InvalidVersion {
                    line: line_no,
                    name,
                    version,
                });
                context = None;
                continue;
            }
        };

        if !parsed.requirements.contains(&requirement) {
            parsed.requirements.push(requirement.clone());
        }

        for command in commands
            .into_iter()
            .flat_map(|c| c.split(','))
            .map(str::trim)
            .filter(|c| !c.is_empty())
        {
            match parse_directive(command) {
                Some(directive) => parsed.directives.push((requirement.clone(), directive)),
                None => parsed.warnings.push(ManifestWarning::InvalidDirective {
                    line: line_no,
                    text: command.to_string(),
                }),
            }
        }

        context = Some(requirement);
    }

    parsed
}

/// Read and parse a manifest file. Invalid UTF-8 is replaced, not rejected.
///
/// # Errors
///
/// Returns the I/O error if the file cannot be read.
pub fn read_manifest(path: &Path) -> std::io::Result<ParsedManifest> {
    let bytes = std::fs::read(path)?;
    Ok(parse_manifest(&String::from_utf8_lossy(&bytes)))
}

/// Toolchain declared by the first significant line of `path`, if any.
pub fn read_toolchain_tag(path: &Path) -> Option<ToolchainTag> {
    read_manifest(path).ok()?.toolchain
}

/// Result of [`append_requirements`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestEdit {
    /// Requirements written to the file.
    pub added: Vec<PackageRequirement>,
    /// Requirements skipped because the name was already declared.
    pub already_present: Vec<PackageRequirement>,
    /// Whether a toolchain tag line was prepended.
    pub tagged: bool,
}

/// Append requirements to the manifest at `path`, creating it if needed.
///
/// Names already declared are skipped. A file without a leading toolchain tag
/// gets `[toolchain]` prepended. Existing lines are kept verbatim.
///
/// # Errors
///
/// Returns the I/O error if the file cannot be read or written.
pub fn append_requirements(
    path: &Path,
    requirements: &[PackageRequirement],
    toolchain: &ToolchainTag,
) -> std::io::Result<ManifestEdit> {
    let existing = match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).to_string(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };
    let parsed = parse_manifest(&existing);

    let mut lines: Vec<String> = existing
        .strip_prefix('\u{feff}')
        .unwrap_or(&existing)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    let mut edit = ManifestEdit::default();
    if parsed.toolchain.is_none() {
        lines.insert(0, format!("[{toolchain}]"));
        edit.tagged = true;
    }

    let mut declared: Vec<&PackageName> = parsed.requirements.iter().map(|r| &r.name).collect();
    for requirement in requirements {
        if declared.contains(&&requirement.name) {
            edit.already_present.push(requirement.clone());
            continue;
        }
        lines.push(requirement.to_string());
        declared.push(&requirement.name);
        edit.added.push(requirement.clone());
    }

    if edit.added.is_empty() && !edit.tagged {
        return Ok(edit);
    }

    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(path, content)?;
    Ok(edit)
}
