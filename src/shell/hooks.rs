use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
}

impl Shell {
    pub const ALL: [Shell; 2] = [Shell::Bash, Shell::Zsh];

    pub fn name(self) -> &'static str {
        match self {
            Shell::Bash => "bash",
            Shell::Zsh => "zsh",
        }
    }

    pub fn rc_file(self, home: &Path) -> PathBuf {
        match self {
            Shell::Bash => home.join(".bashrc"),
            Shell::Zsh => home.join(".zshrc"),
        }
    }

    fn start_marker(self) -> String {
        format!("# >>> repty {} hook >>>", self.name())
    }

    fn end_marker(self) -> String {
        format!("# <<< repty {} hook <<<", self.name())
    }
}

impl fmt::Display for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Absolute path of the running binary, so hooks work without `repty` on PATH.
pub fn current_binary() -> String {
    std::env::current_exe()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| "repty".to_string())
}

/// Hook script for `eval "$(repty init <shell>)"`.
///
/// Each finished command is handed to `repty log` in the background with the
/// directory it started in. Our own invocations and `source`/`.` lines are
/// skipped before the binary runs. Bash tells reruns apart by history number,
/// so repeating a command logs it again while an empty prompt logs nothing.
pub fn hook_script(shell: Shell, bin: &str) -> String {
    match shell {
        Shell::Zsh => format!(
            r#"__repty_preexec() {{
    export __REPTY_CMD="$1"
    export __REPTY_CWD="$PWD"
}}

__repty_precmd() {{
    local exit_code=$?
    if [ -n "$__REPTY_CMD" ]; then
        case "$__REPTY_CMD" in
            "repty "*|"source "*|". "*) ;;
            *) "{bin}" log --command "$__REPTY_CMD" --cwd "${{__REPTY_CWD:-$PWD}}" --exit $exit_code >/dev/null 2>&1 &! ;;
        esac
        unset __REPTY_CMD __REPTY_CWD
    fi
}}

autoload -Uz add-zsh-hook
add-zsh-hook preexec __repty_preexec
add-zsh-hook precmd __repty_precmd
"#
        ),
        Shell::Bash => format!(
            r#"__repty_preexec() {{
    [ -n "$__REPTY_ARMED" ] || return 0
    [ "$BASH_COMMAND" = "__repty_prompt" ] && return 0
    __REPTY_ARMED=
    __REPTY_CWD="$PWD"
}}

__repty_prompt() {{
    local exit_code=$? entry num cmd
    entry=$(HISTTIMEFORMAT= builtin history 1)
    if [[ $entry =~ ^[[:space:]]*([0-9]+)[[:space:]]+(.*)$ ]]; then
        num=${{BASH_REMATCH[1]}}
        cmd=${{BASH_REMATCH[2]}}
    fi
    if [ -n "$__REPTY_CWD" ] && [ -n "$num" ] && [ "$num" != "$__REPTY_LAST_NUM" ]; then
        case "$cmd" in
            "repty "*|"source "*|". "*) ;;
            *) ("{bin}" log --command "$cmd" --cwd "$__REPTY_CWD" --exit $exit_code >/dev/null 2>&1 &) ;;
        esac
    fi
    __REPTY_LAST_NUM=$num
    __REPTY_CWD=
    __REPTY_ARMED=1
    return $exit_code
}}

trap '__repty_preexec' DEBUG
case ";$PROMPT_COMMAND;" in
    *";__repty_prompt;"*) ;;
    *) PROMPT_COMMAND="__repty_prompt${{PROMPT_COMMAND:+;$PROMPT_COMMAND}}" ;;
esac
"#
        ),
    }
}

/// Marker-delimited block appended to an rc file.
pub fn rc_block(shell: Shell, bin: &str) -> String {
    format!(
        "{}\neval \"$(\"{}\" init {})\"\n{}\n",
        shell.start_marker(),
        bin,
        shell.name(),
        shell.end_marker()
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookChange {
    Installed,
    AlreadyPresent,
    Removed,
    NotPresent,
}

impl fmt::Display for HookChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HookChange::Installed => "installed",
            HookChange::AlreadyPresent => "already installed",
            HookChange::Removed => "removed",
            HookChange::NotPresent => "not installed",
        })
    }
}

/// Append the hook block to `rc` unless its start marker is already there.
pub fn install_hook(rc: &Path, shell: Shell, bin: &str) -> Result<HookChange> {
    let existing = match std::fs::read_to_string(rc) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", rc.display())),
    };
    if existing.contains(&shell.start_marker()) {
        return Ok(HookChange::AlreadyPresent);
    }

    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(&rc_block(shell, bin));
    std::fs::write(rc, updated).with_context(|| format!("Failed to write {}", rc.display()))?;
    Ok(HookChange::Installed)
}

/// Remove every marker-delimited block for `shell` from `rc`.
pub fn remove_hook(rc: &Path, shell: Shell) -> Result<HookChange> {
    let content = match std::fs::read_to_string(rc) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HookChange::NotPresent),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", rc.display())),
    };

    let start = shell.start_marker();
    let end = shell.end_marker();
    let mut kept = Vec::new();
    let mut inside = false;
    let mut removed = false;
    for line in content.lines() {
        if line.trim() == start {
            inside = true;
            removed = true;
            continue;
        }
        if inside {
            if line.trim() == end {
                inside = false;
            }
            continue;
        }
        kept.push(line);
    }

    if !removed {
        return Ok(HookChange::NotPresent);
    }
    let mut updated = kept.join("\n");
    if !updated.is_empty() {
        updated.push('\n');
    }
    std::fs::write(rc, updated).with_context(|| format!("Failed to write {}", rc.display()))?;
    Ok(HookChange::Removed)
}

/// Install into every supported rc file under `home`, reporting each one.
pub fn install_all(home: &Path, bin: &str) -> Vec<(PathBuf, Result<HookChange>)> {
    Shell::ALL
        .iter()
        .map(|&shell| {
            let rc = shell.rc_file(home);
            let outcome = install_hook(&rc, shell, bin);
            (rc, outcome)
        })
        .collect()
}

pub fn remove_all(home: &Path) -> Vec<(PathBuf, Result<HookChange>)> {
    Shell::ALL
        .iter()
        .map(|&shell| {
            let rc = shell.rc_file(home);
            let outcome = remove_hook(&rc, shell);
            (rc, outcome)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_skip_internal_prefixes() {
        for shell in Shell::ALL {
            let script = hook_script(shell, "/usr/local/bin/repty");
            assert!(script.contains(r#""repty "*|"source "*|". "*)"#));
            assert!(script.contains("\"/usr/local/bin/repty\" log --command"));
        }
    }

    #[test]
    fn test_scripts_log_start_directory() {
        let bash = hook_script(Shell::Bash, "repty");
        assert!(bash.contains("trap '__repty_preexec' DEBUG"));
        assert!(bash.contains(r#"--cwd "$__REPTY_CWD""#));
        assert!(bash.contains(r#""$num" != "$__REPTY_LAST_NUM""#));
        assert!(!bash.contains(r#"--cwd "$PWD""#));

        let zsh = hook_script(Shell::Zsh, "repty");
        assert!(zsh.contains(r#"export __REPTY_CWD="$PWD""#));
        assert!(zsh.contains(r#"--cwd "${__REPTY_CWD:-$PWD}""#));
    }

    #[cfg(unix)]
    #[test]
    fn test_bash_hook_logs_reruns_with_start_directory() {
        use std::os::unix::fs::PermissionsExt;
        use std::process::Command;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let (start, next) = (dir.path().join("start"), dir.path().join("next"));
        std::fs::create_dir_all(&start).unwrap();
        std::fs::create_dir_all(&next).unwrap();
        let calls = dir.path().join("calls.txt");
        let bin = dir.path().join("fake-repty");
        std::fs::write(
            &bin,
            format!("#!/bin/sh\nprintf '%s|' \"$@\" >> '{}'\necho >> '{}'\n", calls.display(), calls.display()),
        )
        .unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

        let script = hook_script(Shell::Bash, &bin.to_string_lossy());
        let session = format!(
            "{script}\ncd '{start}'\n__repty_prompt\n\
             history -s 'cd {next}'\ncd '{next}'\n__repty_prompt\n\
             history -s 'make test'\nfalse\n__repty_prompt\n\
             history -s 'make test'\nfalse\n__repty_prompt\n__repty_prompt\ntrue\n",
            start = start.display(),
            next = next.display(),
        );
        let Ok(status) = Command::new("bash")
            .args(["--norc", "--noprofile", "-c", &session])
            .env_remove("BASH_ENV")
            .status()
        else {
            return; // no bash on this machine
        };
        assert!(status.success());

        let logged = || std::fs::read_to_string(&calls).unwrap_or_default();
        for _ in 0..100 {
            if logged().lines().count() >= 3 {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        std::thread::sleep(Duration::from_millis(100));
        let lines: Vec<String> = logged().lines().map(str::to_string).collect();
        assert_eq!(lines.len(), 3, "{lines:?}");

        let cd = format!(
            "log|--command|cd {}|--cwd|{}|--exit|0|",
            next.display(),
            start.display()
        );
        let make = format!("log|--command|make test|--cwd|{}|--exit|1|", next.display());
        assert_eq!(lines.iter().filter(|l| **l == cd).count(), 1);
        assert_eq!(lines.iter().filter(|l| **l == make).count(), 2);
    }

    #[test]
    fn test_install_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let rc = dir.path().join(".zshrc");
        std::fs::write(&rc, "export PATH=$HOME/bin:$PATH").unwrap();

        assert_eq!(install_hook(&rc, Shell::Zsh, "repty").unwrap(), HookChange::Installed);
        assert_eq!(
            install_hook(&rc, Shell::Zsh, "repty").unwrap(),
            HookChange::AlreadyPresent
        );

        let content = std::fs::read_to_string(&rc).unwrap();
        assert_eq!(content.matches("# >>> repty zsh hook >>>").count(), 1);
        assert!(content.starts_with("export PATH=$HOME/bin:$PATH\n# >>> repty zsh hook >>>"));
    }

    #[test]
    fn test_remove_restores_surrounding_lines() {
        let dir = tempfile::tempdir().unwrap();
        let rc = dir.path().join(".bashrc");
        std::fs::write(&rc, "alias ll='ls -l'\n").unwrap();
        install_hook(&rc, Shell::Bash, "repty").unwrap();
        std::fs::write(
            &rc,
            std::fs::read_to_string(&rc).unwrap() + "alias gs='git status'\n",
        )
        .unwrap();

        assert_eq!(remove_hook(&rc, Shell::Bash).unwrap(), HookChange::Removed);
        assert_eq!(
            std::fs::read_to_string(&rc).unwrap(),
            "alias ll='ls -l'\nalias gs='git status'\n"
        );
        assert_eq!(remove_hook(&rc, Shell::Bash).unwrap(), HookChange::NotPresent);
    }

    #[test]
    fn test_missing_rc_files() {
        let dir = tempfile::tempdir().unwrap();
        let removed = remove_all(dir.path());
        assert!(removed
            .iter()
            .all(|(_, r)| matches!(r, Ok(HookChange::NotPresent))));

        let installed = install_all(dir.path(), "repty");
        assert_eq!(installed.len(), 2);
        assert!(dir.path().join(".bashrc").exists());
        assert!(dir.path().join(".zshrc").exists());
    }

    #[test]
    fn test_other_shell_block_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let rc = dir.path().join(".zshrc");
        install_hook(&rc, Shell::Bash, "repty").unwrap();
        assert_eq!(remove_hook(&rc, Shell::Zsh).unwrap(), HookChange::NotPresent);
        assert!(std::fs::read_to_string(&rc)
            .unwrap()
            .contains("# >>> repty bash hook >>>"));
    }
}
