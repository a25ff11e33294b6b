use semver::{BuildMetadata, Version};

/// Dist tag that stable releases are published under.
pub const STABLE_TAG: &str = "latest";

fn parse_version(version: &str) -> Option<Version> {
    let trimmed = version.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    let mut parsed = Version::parse(trimmed).ok()?;
    // Build metadata has no bearing on precedence.
    parsed.build = BuildMetadata::EMPTY;
    Some(parsed)
}

/// Resolve the distribution channel a version was published to.
///
/// Releases without a pre-release qualifier belong to the stable tag. A
/// pre-release belongs to the tag named by the alphabetic prefix of its first
/// identifier, so `2.0.0-beta.3` resolves to `beta` and `2.0.0-rc1` to `rc`.
/// Anything that cannot be classified falls back to the stable tag.
pub fn dist_tag_for(version: &str) -> String {
    let Some(parsed) = parse_version(version) else {
        return STABLE_TAG.to_string();
    };
    if parsed.pre.is_empty() {
        return STABLE_TAG.to_string();
    }

    let first = parsed.pre.as_str().split('.').next().unwrap_or_default();
    let prefix: String = first
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_lowercase();

    if prefix.is_empty() {
        STABLE_TAG.to_string()
    } else {
        prefix
    }
}

/// True when `latest` is strictly newer than `current`.
///
/// Unparsable input on either side never reports an update.
pub fn has_update(current: &str, latest: &str) -> bool {
    match (parse_version(current), parse_version(latest)) {
        (Some(current), Some(latest)) => latest > current,
        _ => false,
    }
}
