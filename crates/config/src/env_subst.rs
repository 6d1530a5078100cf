/// Replace `${ENV_VAR}` and `${ENV_VAR:-default}` placeholders in raw config
/// text.
///
/// A variable that is unset and has no default is left as-is.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated placeholder: emit the remainder verbatim.
            result.push_str(&rest[start..]);
            return result;
        };

        let body = &after[..end];
        let (name, default) = match body.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (body, None),
        };

        match (name.is_empty(), lookup(name), default) {
            (false, Some(value), _) => result.push_str(&value),
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

    fn lookup(name: &str) -> Option<String> {
        match name {
            "GEM_TOKEN" => Some("s3cret".to_string()),
            _ => None,
        }
    }

    #[test]
    fn substitutes_known_var() {
        assert_eq!(
            substitute_env_with("token = \"${GEM_TOKEN}\"", lookup),
            "token = \"s3cret\""
        );
    }

    #[test]
    fn uses_default_when_unset() {
        assert_eq!(
            substitute_env_with("url = \"${GEM_URL:-http://localhost/}\"", lookup),
            "url = \"http://localhost/\""
        );
    }

    #[test]
    fn set_var_wins_over_default() {
        assert_eq!(substitute_env_with("${GEM_TOKEN:-x}", lookup), "s3cret");
    }

    #[test]
    fn leaves_unknown_var() {
        assert_eq!(
            substitute_env_with("${BOTBRIDGE_NOPE}", lookup),
            "${BOTBRIDGE_NOPE}"
        );
    }

    #[test]
    fn unterminated_placeholder_is_literal() {
        assert_eq!(substitute_env_with("a ${OPEN", lookup), "a ${OPEN");
    }

    #[test]
    fn no_placeholders() {
        assert_eq!(substitute_env("plain text"), "plain text");
    }
}
