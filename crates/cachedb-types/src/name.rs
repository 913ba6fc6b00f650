use crate::error::{TypesError, TypesResult};

/// Names that map onto files or directories the layout already uses.
const RESERVED: &[&str] = &["metadata", "backups", "exports"];

/// Check that `name` can be used as a collection file stem.
pub fn validate_collection_name(name: &str) -> TypesResult<()> {
    let invalid = |reason| {
        Err(TypesError::InvalidCollectionName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return invalid("empty name");
    }
    if RESERVED.contains(&name) {
        return invalid("reserved name");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return invalid("only ASCII letters, digits, '_' and '-' are allowed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_names() {
        for name in ["datasets", "users", "data_flows", "cards-v2"] {
            assert!(validate_collection_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_reserved_and_path_like_names() {
        for name in ["", "metadata", "backups", "exports", "../etc", "a/b", "a.json", "sp ace"] {
            assert!(validate_collection_name(name).is_err(), "{name}");
        }
    }
}
