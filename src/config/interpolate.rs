//! Extended interpolation: `${option}`, `${section:option}` and `$$`.

use super::parse::option_key;
use super::Config;
use crate::error::{Error, Result};

/// References nested deeper than this are treated as a loop.
const MAX_DEPTH: usize = 10;

/// Expand every reference in `raw`, a value of `option` in `section`.
pub(crate) fn expand(config: &Config, section: &str, option: &str, raw: &str) -> Result<String> {
    expand_at(config, section, option, raw, 1)
}

/// Check that every `$` in `raw` starts `$$` or a complete `${...}`,
/// without resolving anything.
pub(crate) fn check_syntax(section: &str, option: &str, raw: &str) -> Result<()> {
    let fail = |reason: String| Error::Interpolation {
        section: section.to_string(),
        option: option.to_string(),
        reason,
    };

    let mut rest = raw;
    while let Some(pos) = rest.find('$') {
        let after = &rest[pos + 1..];
        if let Some(tail) = after.strip_prefix('$') {
            rest = tail;
        } else if let Some(tail) = after.strip_prefix('{') {
            let end = tail
                .find('}')
                .ok_or_else(|| fail(format!("unterminated reference in '{raw}'")))?;
            let reference = &tail[..end];
            if reference.matches(':').count() > 1 {
                return Err(fail(format!("more than one ':' in '${{{reference}}}'")));
            }
            rest = &tail[end + 1..];
        } else {
            return Err(fail(format!(
                "'$' must be followed by '$' or '{{' in '{raw}'"
            )));
        }
    }
    Ok(())
}

fn expand_at(
    config: &Config,
    section: &str,
    option: &str,
    raw: &str,
    depth: usize,
) -> Result<String> {
    let fail = |reason: String| Error::Interpolation {
        section: section.to_string(),
        option: option.to_string(),
        reason,
    };

    if depth > MAX_DEPTH {
        return Err(fail(format!(
            "references nested deeper than {MAX_DEPTH} levels in '{raw}'"
        )));
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
        } else if let Some(tail) = after.strip_prefix('{') {
            let end = tail
                .find('}')
                .ok_or_else(|| fail(format!("unterminated reference in '{raw}'")))?;
            let reference = &tail[..end];
            let (ref_section, ref_option) = match reference.split_once(':') {
                Some((s, o)) => (s.trim(), option_key(o)),
                None => (section, option_key(reference)),
            };
            if ref_section.contains(':') || ref_option.contains(':') {
                return Err(fail(format!("more than one ':' in '${{{reference}}}'")));
            }
            let target = config
                .lookup_raw(ref_section, &ref_option)
                .ok_or_else(|| fail(format!("'${{{reference}}}' does not resolve")))?;
            let expanded = expand_at(config, ref_section, &ref_option, target, depth + 1)?;
            out.push_str(&expanded);
            rest = &tail[end + 1..];
        } else {
            return Err(fail(format!(
                "'$' must be followed by '$' or '{{' in '{raw}'"
            )));
        }
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::check_syntax;
    use crate::config::Config;
    use crate::error::Error;

    fn config(text: &str) -> Config {
        text.parse().unwrap()
    }

    #[test]
    fn same_section_and_default_references() {
        let cfg = config(
            "[DEFAULT]\nroot = /data\n[cube]\nname = m1\nfile = ${root}/${name}.fits\n",
        );
        assert_eq!(
            cfg.get("cube", "file").unwrap().as_deref(),
            Some("/data/m1.fits")
        );
    }

    #[test]
    fn cross_section_reference() {
        let cfg = config("[INFO]\nname = M1\n[cube]\ntitle = ${INFO:name} cube\n");
        assert_eq!(cfg.get("cube", "title").unwrap().as_deref(), Some("M1 cube"));
    }

    #[test]
    fn nested_references_resolve_in_their_own_section() {
        let cfg = config("[a]\nx = 1\ny = ${x}2\n[b]\nz = ${a:y}3\n");
        assert_eq!(cfg.get("b", "z").unwrap().as_deref(), Some("123"));
    }

    #[test]
    fn dollar_escape() {
        let cfg = config("[a]\nprice = $$5\n");
        assert_eq!(cfg.get("a", "price").unwrap().as_deref(), Some("$5"));
    }

    #[test]
    fn unresolved_reference_fails_at_read() {
        let err = "[a]\nx = ${missing}\n".parse::<Config>().err().unwrap();
        assert!(matches!(err, Error::Interpolation { .. }));
    }

    #[test]
    fn self_reference_is_a_loop() {
        let err = "[a]\nx = ${y}\ny = ${x}\n".parse::<Config>().err().unwrap();
        assert!(matches!(err, Error::Interpolation { .. }));
    }

    #[test]
    fn bare_dollar_fails() {
        let err = "[a]\nx = 5$\n".parse::<Config>().err().unwrap();
        assert!(matches!(err, Error::Interpolation { .. }));
    }

    #[test]
    fn syntax_check_accepts_escapes_and_references() {
        assert!(check_syntax("a", "x", "$$5 ${root}/${INFO:name}").is_ok());
        assert!(check_syntax("a", "x", "${missing}").is_ok());
        assert!(check_syntax("a", "x", "5$").is_err());
        assert!(check_syntax("a", "x", "${open").is_err());
        assert!(check_syntax("a", "x", "${a:b:c}").is_err());
    }

    #[test]
    fn default_reference_resolves_in_inheriting_section() {
        let cfg = config("[DEFAULT]\nfile = ${stem}.fits\n[cube]\ntype = cube\nstem = /data/m1\n");
        assert_eq!(
            cfg.get("cube", "file").unwrap().as_deref(),
            Some("/data/m1.fits")
        );
    }

    #[test]
    fn default_reference_fails_in_section_that_cannot_resolve_it() {
        let err = "[DEFAULT]\nfile = ${stem}.fits\n[cube]\nstem = /data/m1\n[image]\ntype = image\n"
            .parse::<Config>()
            .err()
            .unwrap();
        assert!(matches!(err, Error::Interpolation { section, .. } if section == "image"));
    }

    #[test]
    fn default_reference_overridden_everywhere_is_checked_in_default() {
        let err = "[DEFAULT]\nfile = ${stem}.fits\n".parse::<Config>().err().unwrap();
        assert!(matches!(err, Error::Interpolation { section, .. } if section == "DEFAULT"));

        let cfg = config("[DEFAULT]\nstem = x\nfile = ${stem}.fits\n[cube]\nfile = /y.fits\n");
        assert_eq!(cfg.get("cube", "file").unwrap().as_deref(), Some("/y.fits"));
    }
}
