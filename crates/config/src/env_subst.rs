/// Replace `${ENV_VAR}` and `${ENV_VAR:-default}` placeholders in raw config text.
///
/// Unresolvable variables without a default are left as-is.
pub fn substitute_env(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok())
}

fn substitute_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated: emit the remainder literally.
            result.push_str(&rest[start..]);
            return result;
        };

        let body = &after[..end];
        let (name, default) = match body.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (body, None),
        };

        match (name.is_empty(), lookup(name), default) {
            (false, Some(val), _) => result.push_str(&val),
            (false, None, Some(default)) => result.push_str(default),
            _ => {
                result.push_str("${");
                result.push_str(body);
                result.push('}');
            },
        }
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake(name: &str) -> Option<String> {
        (name == "KB_ROOT").then(|| "/srv/kb".to_string())
    }

    #[test]
    fn substitutes_known_var() {
        assert_eq!(
            substitute_with("docs = \"${KB_ROOT}/docs\"", fake),
            "docs = \"/srv/kb/docs\""
        );
    }

    #[test]
    fn uses_default_when_unset() {
        assert_eq!(substitute_with("${MISSING:-data/kb}", fake), "data/kb");
        assert_eq!(substitute_with("${KB_ROOT:-data/kb}", fake), "/srv/kb");
    }

    #[test]
    fn leaves_unknown_and_malformed() {
        assert_eq!(substitute_with("${FINRAG_NOPE}", fake), "${FINRAG_NOPE}");
        assert_eq!(substitute_with("x ${KB_ROOT", fake), "x ${KB_ROOT");
        assert_eq!(substitute_with("${}", fake), "${}");
    }
}
