//! Launch command parsing -- tokenize caller-supplied command lines and
//! prepare a `<runtime> run` invocation for detached, named execution.
//!
//! Commands are never handed to a shell. Quoting follows POSIX shell rules
//! closely enough for container command lines: single quotes are literal,
//! double quotes allow `\"`, `\\`, `\$` and `` \` `` escapes, and a backslash
//! outside quotes escapes the next character.

use thiserror::Error;

/// Prefix of synthesized container names.
pub const CONTAINER_NAME_PREFIX: &str = "test-container-";

/// Short flags of `run` that never take a value.
const BOOLEAN_SHORT_FLAGS: &str = "diPt";

/// Long flags of `run` that never take a separate value token.
const BOOLEAN_LONG_FLAGS: &[&str] = &[
    "detach",
    "help",
    "init",
    "interactive",
    "no-healthcheck",
    "oom-kill-disable",
    "privileged",
    "publish-all",
    "quiet",
    "read-only",
    "replace",
    "rm",
    "sig-proxy",
    "tty",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LaunchError {
    #[error("command is empty")]
    Empty,

    #[error("unterminated {0} quote")]
    UnterminatedQuote(char),

    #[error("trailing backslash")]
    TrailingEscape,

    #[error("Command must start with \"{expected} run\"")]
    NotARunCommand { expected: String },
}

/// A launch command ready to hand to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub argv: Vec<String>,
    pub container_name: String,
}

/// Split a command line into arguments.
pub fn tokenize(input: &str) -> Result<Vec<String>, LaunchError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err(LaunchError::UnterminatedQuote('\'')),
                    }
                }
            }
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch @ ('"' | '\\' | '$' | '`')) => current.push(ch),
                            Some('\n') => {}
                            Some(ch) => {
                                current.push('\\');
                                current.push(ch);
                            }
                            None => return Err(LaunchError::UnterminatedQuote('"')),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err(LaunchError::UnterminatedQuote('"')),
                    }
                }
            }
            '\\' => match chars.next() {
                // line continuation
                Some('\n') => {}
                Some(ch) => {
                    in_token = true;
                    current.push(ch);
                }
                None => return Err(LaunchError::TrailingEscape),
            },
            ch => {
                in_token = true;
                current.push(ch);
            }
        }
    }

    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Tokenize `command` and check it is `<runtime> run ...` for one of `runtimes`.
///
/// `runtimes` must not be empty; its first entry is named in the error message.
pub fn parse_launch_command(command: &str, runtimes: &[&str]) -> Result<Vec<String>, LaunchError> {
    let argv = tokenize(command)?;
    if argv.is_empty() {
        return Err(LaunchError::Empty);
    }

    let is_run = argv.len() >= 2
        && runtimes.contains(&argv[0].as_str())
        && argv[1] == "run";
    if !is_run {
        return Err(LaunchError::NotARunCommand {
            expected: runtimes.first().copied().unwrap_or("docker").to_string(),
        });
    }
    Ok(argv)
}

/// Tokenize a test command. It must contain at least one argument.
pub fn parse_test_command(command: &str) -> Result<Vec<String>, LaunchError> {
    let argv = tokenize(command)?;
    if argv.is_empty() {
        return Err(LaunchError::Empty);
    }
    Ok(argv)
}

/// Name given to containers the caller did not name: `test-container-<first 8 chars of id>`.
pub fn default_container_name(execution_id: &str) -> String {
    let short: String = execution_id.chars().take(8).collect();
    format!("{}{}", CONTAINER_NAME_PREFIX, short)
}

/// What the option section of a `run` command already specifies.
#[derive(Debug, Default, PartialEq, Eq)]
struct RunOptions {
    name_flag: bool,
    name: Option<String>,
    detach: bool,
    /// Positions of `--detach=<value>` tokens.
    detach_values: Vec<usize>,
}

/// Scan the options between `run` and the image reference.
fn scan_run_options(argv: &[String]) -> RunOptions {
    let mut opts = RunOptions::default();
    let mut i = 2;

    while i < argv.len() {
        let token = argv[i].as_str();

        if token == "--" {
            break;
        }

        if let Some(long) = token.strip_prefix("--") {
            let (flag, inline) = match long.split_once('=') {
                Some((flag, value)) => (flag, Some(value)),
                None => (long, None),
            };
            match flag {
                "name" => {
                    opts.name_flag = true;
                    match inline {
                        Some(value) => opts.name = Some(value.to_string()),
                        None => {
                            opts.name = argv.get(i + 1).cloned();
                            i += 1;
                        }
                    }
                }
                "detach" => {
                    opts.detach = inline.map_or(true, |v| v != "false");
                    if inline.is_some() {
                        opts.detach_values.push(i);
                    }
                }
                f if BOOLEAN_LONG_FLAGS.contains(&f) => {}
                _ => {
                    if inline.is_none() {
                        i += 1;
                    }
                }
            }
        } else if let Some(cluster) = token.strip_prefix('-').filter(|c| !c.is_empty()) {
            // `-dit`, `-e KEY=VAL`, `-p8080:80`, `-ite VAR`
            for (pos, c) in cluster.char_indices() {
                if BOOLEAN_SHORT_FLAGS.contains(c) {
                    if c == 'd' {
                        opts.detach = true;
                    }
                    continue;
                }
                if pos + c.len_utf8() == cluster.len() {
                    i += 1;
                }
                break;
            }
        } else {
            // image reference
            break;
        }

        i += 1;
    }

    opts
}

/// Resolve the container name and make sure the command runs detached.
///
/// Missing `--name` / `-d` flags are inserted right after `run`, so they stay
/// in the option section regardless of what follows the image. When the
/// command asks for `--detach=false`, that token is dropped so the injected
/// `-d` is the only detach setting left.
pub fn prepare(argv: &[String], execution_id: &str) -> LaunchPlan {
    let opts = scan_run_options(argv);
    let container_name = opts
        .name
        .clone()
        .unwrap_or_else(|| default_container_name(execution_id));

    let mut injected = Vec::new();
    if !opts.detach {
        injected.push("-d".to_string());
    }
    if !opts.name_flag {
        injected.push("--name".to_string());
        injected.push(container_name.clone());
    }

    let split = argv.len().min(2);
    let mut prepared = Vec::with_capacity(argv.len() + injected.len());
    prepared.extend_from_slice(&argv[..split]);
    prepared.extend(injected);
    prepared.extend(
        argv.iter()
            .enumerate()
            .skip(split)
            .filter(|(i, _)| opts.detach || !opts.detach_values.contains(i))
            .map(|(_, token)| token.clone()),
    );

    LaunchPlan {
        argv: prepared,
        container_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_tokenize_plain_whitespace() {
        assert_eq!(
            tokenize("  docker   run\t-d alpine  ").unwrap(),
            words("docker run -d alpine")
        );
    }

    #[test]
    fn test_tokenize_quotes() {
        assert_eq!(
            tokenize(r#"sh -c 'echo "hi there"' "a b" c\ d"#).unwrap(),
            vec!["sh", "-c", "echo \"hi there\"", "a b", "c d"]
        );
        assert_eq!(tokenize(r#"echo "say \"x\" \n""#).unwrap(), vec!["echo", "say \"x\" \\n"]);
        assert_eq!(tokenize("printf ''").unwrap(), vec!["printf", ""]);
    }

    #[test]
    fn test_tokenize_errors() {
        assert_eq!(tokenize("echo 'oops"), Err(LaunchError::UnterminatedQuote('\'')));
        assert_eq!(tokenize("echo \"oops"), Err(LaunchError::UnterminatedQuote('"')));
        assert_eq!(tokenize("echo oops\\"), Err(LaunchError::TrailingEscape));
        assert!(tokenize("   ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_launch_requires_run_subcommand() {
        assert!(parse_launch_command("docker run alpine", &["docker"]).is_ok());
        assert!(parse_launch_command("podman run alpine", &["docker", "podman"]).is_ok());

        let err = parse_launch_command("docker ps", &["docker"]).unwrap_err();
        assert_eq!(err.to_string(), "Command must start with \"docker run\"");
        assert!(parse_launch_command("docker runx alpine", &["docker"]).is_err());
        assert!(parse_launch_command("podman run alpine", &["docker"]).is_err());
        assert!(parse_launch_command("rm -rf /", &["docker"]).is_err());
        assert_eq!(parse_launch_command("", &["docker"]), Err(LaunchError::Empty));
    }

    #[test]
    fn test_default_container_name_uses_id_prefix() {
        assert_eq!(
            default_container_name("0123456789abcdef"),
            "test-container-01234567"
        );
        assert_eq!(default_container_name("abc"), "test-container-abc");
    }

    #[test]
    fn test_prepare_injects_detach_and_name_after_run() {
        let plan = prepare(&words("docker run alpine sleep 100"), "deadbeef-0000");
        assert_eq!(plan.container_name, "test-container-deadbeef");
        assert_eq!(
            plan.argv,
            words("docker run -d --name test-container-deadbeef alpine sleep 100")
        );
    }

    #[test]
    fn test_prepare_keeps_explicit_name_and_detach() {
        let argv = words("docker run -d --name web -p 8080:80 nginx");
        let plan = prepare(&argv, "deadbeef");
        assert_eq!(plan.container_name, "web");
        assert_eq!(plan.argv, argv);

        let argv = words("docker run --detach --name=api nginx");
        let plan = prepare(&argv, "deadbeef");
        assert_eq!(plan.container_name, "api");
        assert_eq!(plan.argv, argv);
    }

    #[test]
    fn test_prepare_recognises_short_flag_clusters() {
        let argv = words("docker run -dit --name box ubuntu bash");
        assert_eq!(prepare(&argv, "x").argv, argv);

        let plan = prepare(&words("docker run -it ubuntu bash"), "cafebabe");
        assert_eq!(
            plan.argv,
            words("docker run -d --name test-container-cafebabe -it ubuntu bash")
        );
    }

    #[test]
    fn test_prepare_ignores_flags_after_image() {
        // `-d` and `--name` here belong to the container's command, not to `run`.
        let plan = prepare(&words("docker run -e MODE=x alpine ls -d --name"), "abcdef12");
        assert_eq!(
            plan.argv,
            words("docker run -d --name test-container-abcdef12 -e MODE=x alpine ls -d --name")
        );
    }

    #[test]
    fn test_prepare_skips_option_values() {
        // `-v /data:/data` and `--network host` take values; `host` is not the image.
        let plan = prepare(
            &words("docker run -v /data:/data --network host --rm -p8080:80 redis --name inner"),
            "12345678",
        );
        assert_eq!(plan.container_name, "test-container-12345678");
        assert_eq!(plan.argv[2..5], words("-d --name test-container-12345678")[..]);
    }

    #[test]
    fn test_prepare_detach_false_is_not_detached() {
        let plan = prepare(&words("docker run --detach=false alpine"), "12345678");
        assert_eq!(
            plan.argv,
            words("docker run -d --name test-container-12345678 alpine")
        );
    }

    #[test]
    fn test_prepare_last_detach_value_wins() {
        let plan = prepare(
            &words("docker run --detach=true -p 80:80 --detach=false nginx --detach=false"),
            "12345678",
        );
        // Only option-section tokens are dropped; the container command is untouched.
        assert_eq!(
            plan.argv,
            words("docker run -d --name test-container-12345678 -p 80:80 nginx --detach=false")
        );

        let plan = prepare(&words("docker run --detach=false --detach=true nginx"), "12345678");
        assert_eq!(
            plan.argv,
            words("docker run --name test-container-12345678 --detach=false --detach=true nginx")
        );
    }
}
