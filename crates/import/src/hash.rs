//! Integrity hashing of resolved expressions.

use sha2::{Digest, Sha256};

use timbre_core::{alpha_normalize, encode_expression, EncodeError, Expr, ProtocolVersion};

/// SHA-256 of the canonical encoding of the α-normalized expression. The
/// input must be fully resolved; an import leaf is an encoding error.
pub fn hash_expression(
    version: ProtocolVersion,
    expr: &Expr,
) -> Result<[u8; 32], EncodeError> {
    let bytes = encode_expression(version, &alpha_normalize(expr))?;
    Ok(Sha256::digest(&bytes).into())
}

/// The digest rendered the way it is written in source: `sha256:<hex>`.
pub fn hash_expression_to_code(
    version: ProtocolVersion,
    expr: &Expr,
) -> Result<String, EncodeError> {
    let bytes = encode_expression(version, &alpha_normalize(expr))?;
    Ok(format!("sha256:{:x}", Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use timbre_core::{Expr, Var};

    #[test]
    fn hash_is_alpha_invariant() {
        let named = Expr::Lam(
            "x".to_string(),
            Box::new(Expr::Bool),
            Box::new(Expr::Var(Var::new("x", 0))),
        );
        let renamed = Expr::Lam(
            "y".to_string(),
            Box::new(Expr::Bool),
            Box::new(Expr::Var(Var::new("y", 0))),
        );
        assert_eq!(
            hash_expression(ProtocolVersion::V1, &named).unwrap(),
            hash_expression(ProtocolVersion::V1, &renamed).unwrap()
        );
    }

    #[test]
    fn code_form_is_prefixed_lowercase_hex() {
        let code = hash_expression_to_code(ProtocolVersion::V1, &Expr::BoolLit(true)).unwrap();
        let hex = code.strip_prefix("sha256:").expect("sha256: prefix");
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn unresolved_expressions_do_not_hash() {
        use timbre_core::{Directory, File, FilePrefix, Import, ImportMode, ImportTarget};
        let import = Expr::Embed(Import {
            hash: None,
            target: ImportTarget::Local(
                FilePrefix::Here,
                File {
                    directory: Directory::default(),
                    file: "x".to_string(),
                },
            ),
            mode: ImportMode::Code,
        });
        assert!(hash_expression(ProtocolVersion::V1, &import).is_err());
    }
}
