//! Ordered failure signatures
//!
//! Each signature recognizes one family of toolchain failure in the raw
//! output, pulls out a best-effort detail, and attaches a fixed remediation.
//! The slice order is the precedence order.

use super::{ClassifiedError, ErrorKind, FailureContext};

pub(crate) struct Signature {
    pub name: &'static str,
    pub detect: fn(&str, &FailureContext<'_>) -> Option<ClassifiedError>,
}

pub(crate) const SIGNATURES: &[Signature] = &[
    Signature { name: "scheme_not_found", detect: scheme_not_found },
    Signature { name: "code_signing", detect: code_signing },
    Signature { name: "provisioning_profile", detect: provisioning_profile },
    Signature { name: "missing_module", detect: missing_module },
    Signature { name: "unresolved_package", detect: unresolved_package },
    Signature { name: "repository_clone", detect: repository_clone },
    Signature { name: "sdk_not_installed", detect: sdk_not_installed },
    Signature { name: "destination_not_found", detect: destination_not_found },
    Signature { name: "configuration_not_found", detect: configuration_not_found },
    Signature { name: "project_not_found", detect: project_not_found },
    Signature { name: "xcodebuild_error", detect: xcodebuild_error },
    Signature { name: "failed_build_commands", detect: failed_build_commands },
];

/// Signature names in precedence order
pub fn signature_names() -> impl Iterator<Item = &'static str> {
    SIGNATURES.iter().map(|s| s.name)
}

/// First line containing `needle`, trimmed.
fn line_containing<'a>(raw: &'a str, needle: &str) -> Option<&'a str> {
    raw.lines().map(str::trim).find(|l| l.contains(needle))
}

fn scheme_not_found(raw: &str, _ctx: &FailureContext<'_>) -> Option<ClassifiedError> {
    let name = regex!(r#"does not contain a scheme named "([^"]+)""#)
        .captures(raw)
        .or_else(|| regex!(r"[Ss]cheme\s+'?([^'\s]+)'?\s+is not currently configured").captures(raw))
        .or_else(|| regex!(r#"[Ss]cheme\s+"([^"]+)"\s+(?:does not exist|not found)"#).captures(raw))
        .and_then(|caps| caps.get(1).map(|m| m.as_str().to_string()))?;

    Some(
        ClassifiedError::new(
            ErrorKind::Scheme,
            "Scheme not found",
            format!("Scheme '{}' is not available in the project", name),
        )
        .with_suggestion(
            "Run `xcodebuild -list` to see the available schemes, and make sure the scheme is shared.",
        ),
    )
}

fn code_signing(raw: &str, _ctx: &FailureContext<'_>) -> Option<ClassifiedError> {
    let trigger = regex!(
        r"(?i)code sign(?:ing)? error|requires a development team|no signing certificate|errSecInternalComponent|code ?sign(?:ing)? (?:is required|failed)"
    )
    .find(raw)?;

    let details = regex!(r#"Signing for "([^"]+)" requires a development team"#)
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|target| format!("Target '{}' requires a development team", target.as_str()))
        .unwrap_or_else(|| {
            let start = raw[..trigger.start()].rfind('\n').map(|i| i + 1).unwrap_or(0);
            let end = raw[trigger.start()..]
                .find('\n')
                .map(|i| trigger.start() + i)
                .unwrap_or(raw.len());
            raw[start..end].trim().to_string()
        });

    Some(
        ClassifiedError::new(ErrorKind::Signing, "Code signing failed", details).with_suggestion(
            "Select a development team under Signing & Capabilities or pass DEVELOPMENT_TEAM=<team id>; \
             simulator builds can set CODE_SIGNING_ALLOWED=NO.",
        ),
    )
}

fn provisioning_profile(raw: &str, _ctx: &FailureContext<'_>) -> Option<ClassifiedError> {
    let details = if let Some(caps) = regex!(r"No profiles for '([^']+)' were found").captures(raw) {
        format!("No provisioning profile matches bundle identifier '{}'", &caps[1])
    } else if let Some(caps) = regex!(r#"[Pp]rovisioning profile "([^"]+)" (.+)"#).captures(raw) {
        format!("Provisioning profile '{}' {}", &caps[1], caps[2].trim_end_matches('.'))
    } else {
        line_containing(raw, "requires a provisioning profile")
            .or_else(|| line_containing(raw, "doesn't include the currently selected device"))?
            .to_string()
    };

    Some(
        ClassifiedError::new(ErrorKind::Provisioning, "Provisioning profile problem", details)
            .with_suggestion(
                "Enable automatic signing, or install a provisioning profile that matches the bundle identifier and device.",
            ),
    )
}

fn missing_module(raw: &str, _ctx: &FailureContext<'_>) -> Option<ClassifiedError> {
    let caps = regex!(r"no such module '([^']+)'")
        .captures(raw)
        .or_else(|| regex!(r"module '([^']+)' not found").captures(raw))
        .or_else(|| regex!(r"Unable to find module dependency: '([^']+)'").captures(raw))?;

    Some(
        ClassifiedError::new(
            ErrorKind::Dependency,
            "Missing module",
            format!("Module '{}' could not be found", &caps[1]),
        )
        .with_suggestion(
            "Resolve package dependencies (`xcodebuild -resolvePackageDependencies`) and check that the module is linked to the target.",
        ),
    )
}

fn unresolved_package(raw: &str, _ctx: &FailureContext<'_>) -> Option<ClassifiedError> {
    let details = if let Some(caps) = regex!(r"[Mm]issing package product '([^']+)'").captures(raw) {
        format!("Package product '{}' is missing", &caps[1])
    } else if let Some(caps) = regex!(r"unknown package '([^']+)'").captures(raw) {
        format!("Unknown package '{}'", &caps[1])
    } else if let Some(caps) =
        regex!(r"product '([^']+)' required by package '([^']+)'.*not found").captures(raw)
    {
        format!("Product '{}' required by '{}' was not found", &caps[1], &caps[2])
    } else {
        line_containing(raw, "Could not resolve package dependencies")?.to_string()
    };

    Some(
        ClassifiedError::new(ErrorKind::Dependency, "Package resolution failed", details)
            .with_suggestion(
                "Check the package references in Package.swift or the project, then run `xcodebuild -resolvePackageDependencies`.",
            ),
    )
}

fn repository_clone(raw: &str, _ctx: &FailureContext<'_>) -> Option<ClassifiedError> {
    let caps = regex!(r"Failed to clone repository\s+(\S+?):?(?:\s|$)")
        .captures(raw)
        .or_else(|| regex!(r"fatal: repository '([^']+)' not found").captures(raw))
        .or_else(|| regex!(r"(?i)couldn't fetch updates from remote repositories").captures(raw))?;

    let details = match caps.get(1) {
        Some(url) => format!("Could not clone {}", url.as_str()),
        None => "Could not fetch package repositories".to_string(),
    };

    Some(
        ClassifiedError::new(ErrorKind::Dependency, "Repository clone failed", details)
            .with_suggestion("Check network access and credentials for the package repository URL."),
    )
}

fn sdk_not_installed(raw: &str, ctx: &FailureContext<'_>) -> Option<ClassifiedError> {
    let (platform, details) = if let Some(caps) =
        regex!(r"\b(iOS|iPadOS|tvOS|watchOS|visionOS|xrOS|macOS)\s+(\d+(?:\.\d+)*)\s+is not installed")
            .captures(raw)
    {
        (
            Some(caps[1].to_string()),
            format!("{} {} is not installed", &caps[1], &caps[2]),
        )
    } else if let Some(caps) =
        regex!(r#"SDK\s+["']([^"']+)["']\s+cannot be located"#).captures(raw)
    {
        (None, format!("SDK '{}' cannot be located", &caps[1]))
    } else {
        return None;
    };

    let platform = platform.or_else(|| ctx.platform.map(str::to_string));
    let suggestion = match platform {
        Some(p) => format!(
            "Install the {} platform from Xcode > Settings > Components, or run `xcodebuild -downloadPlatform {}`.",
            p, p
        ),
        None => "Install the missing platform from Xcode > Settings > Components.".to_string(),
    };

    Some(ClassifiedError::new(ErrorKind::Sdk, "SDK not installed", details).with_suggestion(suggestion))
}

fn destination_not_found(raw: &str, ctx: &FailureContext<'_>) -> Option<ClassifiedError> {
    let start = raw.find("Unable to find a destination matching the provided destination specifier")?;

    let details = regex!(r"\{\s*([^}]+?)\s*\}")
        .captures(&raw[start..])
        .map(|caps| format!("No destination matches {{ {} }}", &caps[1]))
        .unwrap_or_else(|| "No destination matches the requested specifier".to_string());

    let suggestion = match ctx.scheme {
        Some(scheme) => format!(
            "List valid destinations with `xcodebuild -showdestinations -scheme {}`.",
            scheme
        ),
        None => "List valid destinations with `xcrun simctl list devices available`.".to_string(),
    };

    Some(
        ClassifiedError::new(ErrorKind::Destination, "Destination not found", details)
            .with_suggestion(suggestion),
    )
}

fn configuration_not_found(raw: &str, ctx: &FailureContext<'_>) -> Option<ClassifiedError> {
    let caps = regex!(r#"[Cc]onfiguration\s+["']([^"']+)["']\s+(?:does not exist|is not defined|not found)"#)
        .captures(raw)
        .or_else(|| regex!(r#"[Cc]ouldn't find (?:a )?configuration named ["']?([^"'\s]+)"#).captures(raw))?;

    let name = caps
        .get(1)
        .map(|m| m.as_str())
        .or(ctx.configuration)
        .unwrap_or_default();

    Some(
        ClassifiedError::new(
            ErrorKind::Configuration,
            "Build configuration not found",
            format!("Build configuration '{}' does not exist", name),
        )
        .with_suggestion(
            "Use a configuration the project defines (usually Debug or Release); `xcodebuild -list` shows them.",
        ),
    )
}

fn project_not_found(raw: &str, _ctx: &FailureContext<'_>) -> Option<ClassifiedError> {
    let details = if let Some(caps) =
        regex!(r#"["']?([^"'\s]+\.(?:xcworkspace|xcodeproj))["']?\s+(?:does not exist|cannot be opened|could not be found)"#)
            .captures(raw)
    {
        format!("'{}' does not exist", &caps[1])
    } else {
        line_containing(raw, "does not contain an Xcode project")?.to_string()
    };

    Some(
        ClassifiedError::new(ErrorKind::Configuration, "Workspace or project not found", details)
            .with_suggestion("Check the -workspace / -project path; it must point at an existing .xcworkspace or .xcodeproj."),
    )
}

fn xcodebuild_error(raw: &str, _ctx: &FailureContext<'_>) -> Option<ClassifiedError> {
    let caps = regex!(r"(?m)^\s*xcodebuild: error:\s*(.+?)\s*$").captures(raw)?;

    Some(
        ClassifiedError::new(ErrorKind::Generic, "xcodebuild error", &caps[1])
            .with_suggestion("Check the xcodebuild arguments and the project settings named in the message."),
    )
}

fn failed_build_commands(raw: &str, _ctx: &FailureContext<'_>) -> Option<ClassifiedError> {
    let start = raw.find("The following build commands failed:")?;

    let commands: Vec<&str> = raw[start..]
        .lines()
        .skip(1)
        .map(str::trim)
        .take_while(|l| !l.is_empty() && !regex!(r"^\(\d+ failures?\)$").is_match(l))
        .collect();

    let details = match commands.first() {
        Some(first) if commands.len() > 1 => {
            format!("{} build commands failed; first: {}", commands.len(), first)
        }
        Some(first) => format!("Build command failed: {}", first),
        None => "Build commands failed".to_string(),
    };

    Some(
        ClassifiedError::new(ErrorKind::Compile, "Build commands failed", details)
            .with_suggestion("Open the full build log and inspect the first failing command."),
    )
}
