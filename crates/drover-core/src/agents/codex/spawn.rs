//! Codex CLI invocation builder.

use crate::options::ExecutionOptions;

/// Build the argv for one Codex prompt. The prompt is always positional.
pub fn build_args(prompt: &str, options: &ExecutionOptions) -> Vec<String> {
    let mut args = vec!["exec".to_string()];

    if options.resume {
        args.push("resume".to_string());
        // validated upstream: resume requires a session id
        if let Some(id) = &options.session_id {
            args.push(id.clone());
        }
    } else if options.continue_conversation {
        args.push("resume".to_string());
        args.push("--last".to_string());
    }

    args.push("--json".to_string());

    if let Some(model) = &options.model {
        args.push("--model".to_string());
        args.push(model.clone());
    }

    if options.dangerously_skip_permissions {
        args.push("--dangerously-bypass-approvals-and-sandbox".to_string());
    } else if let Some(mode) = options.permission_mode {
        args.push("--sandbox".to_string());
        args.push(mode.as_codex_sandbox().to_string());
    }

    for image in &options.images {
        args.push("--image".to_string());
        args.push(image.display().to_string());
    }

    args.push(prompt.to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::PermissionMode;

    #[test]
    fn fresh_run_uses_exec_json() {
        let args = build_args("hi", &ExecutionOptions::new());
        assert_eq!(args[0], "exec");
        assert!(args.contains(&"--json".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("hi"));
    }

    #[test]
    fn resume_inserts_subcommand_and_id() {
        let options = ExecutionOptions::new().session_id("th-1").resume(true);
        let args = build_args("hi", &options);
        assert_eq!(&args[..3], &["exec", "resume", "th-1"]);
    }

    #[test]
    fn continue_resumes_last_thread() {
        let options = ExecutionOptions::new().continue_conversation(true);
        let args = build_args("hi", &options);
        assert_eq!(&args[..3], &["exec", "resume", "--last"]);
    }

    #[test]
    fn permission_mode_maps_to_sandbox() {
        let options = ExecutionOptions::new().permission_mode(PermissionMode::AcceptEdits);
        let args = build_args("hi", &options);
        assert!(args.contains(&"--sandbox".to_string()));
        assert!(args.contains(&"workspace-write".to_string()));
    }

    #[test]
    fn bypass_replaces_sandbox_flag() {
        let options = ExecutionOptions::new()
            .permission_mode(PermissionMode::Plan)
            .dangerously_skip_permissions(true);
        let args = build_args("hi", &options);
        assert!(args.contains(&"--dangerously-bypass-approvals-and-sandbox".to_string()));
        assert!(!args.contains(&"--sandbox".to_string()));
    }

    #[test]
    fn images_use_repeated_flags() {
        let options = ExecutionOptions::new().image("/a.png").image("/b.png");
        let args = build_args("hi", &options);
        assert_eq!(args.iter().filter(|a| *a == "--image").count(), 2);
    }
}
