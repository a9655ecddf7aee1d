// crates/knxproj-rs-xml/src/resolver/utils.rs

//! Identifier and text helpers shared by the resolvers.

/// Removes the project prefix of a project-scoped identifier
/// (`P-0123-0_GA-1` => `GA-1`). Identifiers without prefix are returned as is.
pub(super) fn strip_project_prefix(id: &str) -> &str {
    match id.split_once('_') {
        Some((_, rest)) => rest,
        None => id,
    }
}

/// Removes module and module instance segments from an instance reference,
/// keeping the module definition, the innermost submodule definition and
/// everything from the first `search_id` segment on.
///
/// `MD-1_M-1_MI-1_CH-4` => `MD-1_CH-4` (with `search_id` = `CH`)
pub(super) fn strip_module_instance(text: &str, search_id: &str) -> String {
    let prefix = format!("{}-", search_id);
    let segments: Vec<&str> = text.split('_').collect();
    let Some(position) = segments.iter().position(|s| s.starts_with(&prefix)) else {
        return text.to_string();
    };

    let mut kept: Vec<&str> = Vec::new();
    if position > 0 && segments[0].starts_with("MD-") {
        kept.push(segments[0]);
    }
    if position > 1 && segments[position - 1].starts_with("SM-") {
        kept.push(segments[position - 1]);
    }
    kept.extend_from_slice(&segments[position..]);
    kept.join("_")
}

/// Module and module instance part of an instance reference, i.e. everything
/// from `MD-` up to the last `_<next_id>-` segment.
///
/// `MD-1_M-1_MI-1_CH-4` => `Some("MD-1_M-1_MI-1")` (with `next_id` = `CH`)
pub(super) fn module_instance_part<'a>(reference: &'a str, next_id: &str) -> Option<&'a str> {
    let start = reference.find("MD-")?;
    let marker = format!("_{}-", next_id);
    let end = reference.rfind(&marker)?;
    (end > start).then(|| &reference[start..end])
}

/// Builds the `ParameterInstanceRef` id a `TextParameterRefId` points to for
/// one instance, inserting the module instance for module parameters.
pub(super) fn text_parameter_instance_ref(
    instance_ref: &str,
    instance_next_id: &str,
    text_parameter_ref_id: &str,
) -> String {
    let Some((application, _)) = text_parameter_ref_id.split_once("_MD-") else {
        return text_parameter_ref_id.to_string();
    };
    let Some(module_part) = module_instance_part(instance_ref, instance_next_id) else {
        return text_parameter_ref_id.to_string();
    };
    // `_P-` for parameters, `_UP-` for union parameters.
    let parameter_part = ["_P-", "_UP-"]
        .iter()
        .filter_map(|m| text_parameter_ref_id.find(m))
        .min()
        .map(|i| &text_parameter_ref_id[i + 1..]);
    match parameter_part {
        Some(parameter) => format!("{}_{}_{}", application, module_part, parameter),
        None => text_parameter_ref_id.to_string(),
    }
}

/// Replaces `{{0}}` and `{{0:default}}` placeholders with the value of the
/// text parameter, or with the default if the value is absent or empty.
pub(super) fn replace_text_parameter(text: &str, value: Option<&str>) -> String {
    let value = value.filter(|v| !v.is_empty());
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{0") {
        let Some(len) = rest[start..].find("}}") else {
            break;
        };
        let inner = &rest[start + 3..start + len];
        let default = inner.strip_prefix(':').unwrap_or(inner);
        result.push_str(&rest[..start]);
        result.push_str(value.unwrap_or(default));
        rest = &rest[start + len + 2..];
    }
    result.push_str(rest);
    result
}

/// Replaces `{{name}}` placeholders with the given named values.
pub(super) fn replace_named_placeholders<'a>(
    text: &str,
    values: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> String {
    values
        .into_iter()
        .fold(text.to_string(), |acc, (name, value)| {
            acc.replace(&format!("{{{{{}}}}}", name), value)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_module_instance() {
        assert_eq!(strip_module_instance("CH-4", "CH"), "CH-4");
        assert_eq!(strip_module_instance("MD-1_M-1_MI-1_CH-4", "CH"), "MD-1_CH-4");
        assert_eq!(
            strip_module_instance("MD-4_M-15_MI-1_SM-1_M-1_MI-1-1-2_SM-1_O-3-1_R-2", "O"),
            "MD-4_SM-1_O-3-1_R-2"
        );
        assert_eq!(strip_module_instance("O-2_R-3", "O"), "O-2_R-3");
    }

    #[test]
    fn test_module_instance_part() {
        assert_eq!(module_instance_part("MD-1_M-1_MI-1_CH-4", "CH"), Some("MD-1_M-1_MI-1"));
        assert_eq!(module_instance_part("CH-4", "CH"), None);
        assert_eq!(
            module_instance_part("MD-4_M-15_MI-1_SM-1_M-1_MI-1-1-2_SM-1_O-3-1_R-2", "O"),
            Some("MD-4_M-15_MI-1_SM-1_M-1_MI-1-1-2_SM-1")
        );
    }

    #[test]
    fn test_text_parameter_instance_ref() {
        assert_eq!(
            text_parameter_instance_ref(
                "MD-1_M-1_MI-1_CH-4",
                "CH",
                "M-0083_A-0001-10-ABCD_MD-1_P-2_R-1"
            ),
            "M-0083_A-0001-10-ABCD_MD-1_M-1_MI-1_P-2_R-1"
        );
        assert_eq!(
            text_parameter_instance_ref("O-1_R-1", "O", "M-0083_A-0001-10-ABCD_P-2_R-1"),
            "M-0083_A-0001-10-ABCD_P-2_R-1"
        );
        assert_eq!(
            text_parameter_instance_ref("MD-2_M-3_MI-2_O-1_R-1", "O", "M-0083_A-1_MD-2_UP-7_R-1"),
            "M-0083_A-1_MD-2_M-3_MI-2_UP-7_R-1"
        );
    }

    #[test]
    fn test_replace_text_parameter() {
        assert_eq!(replace_text_parameter("Channel {{0}}", Some("Kitchen")), "Channel Kitchen");
        assert_eq!(replace_text_parameter("Channel {{0:A}}", Some("")), "Channel A");
        assert_eq!(replace_text_parameter("Channel {{0:A}}", None), "Channel A");
        assert_eq!(replace_text_parameter("{{0}} / {{0:x}}", Some("v")), "v / v");
        assert_eq!(replace_text_parameter("no placeholder", Some("v")), "no placeholder");
    }

    #[test]
    fn test_strip_project_prefix() {
        assert_eq!(strip_project_prefix("P-0123-0_GA-1"), "GA-1");
        assert_eq!(strip_project_prefix("GA-1"), "GA-1");
    }

    #[test]
    fn test_replace_named_placeholders() {
        assert_eq!(
            replace_named_placeholders("Output {{ChName}}", [("ChName", "A")]),
            "Output A"
        );
    }
}
