//! Submission dispatch rule.
//!
//! `SubmitTask` comes in from the HTTP layer (out of scope here); this is
//! the one piece of that surface the core owns: deciding how many tasks a
//! submission becomes and of what type.

use dipc_domain::{SubmitTask, Task, TaskType};
use dipc_task_store::in_memory::generate_task_id;

/// One task created by a submission, paired with the queue args its handler
/// expects.
pub struct Dispatched {
    pub task: Task,
}

/// Dispatch rule: if any URL ends with `.zip` (case-insensitive), the whole
/// submission becomes a single `archive` task over all URLs; otherwise one
/// `parse` task per URL.
pub fn dispatch(submit: &SubmitTask) -> Vec<Dispatched> {
    let is_archive = submit.file_urls.iter().any(|url| url.to_lowercase().ends_with(".zip"));

    if is_archive {
        // An archive submission only ever carries one URL in practice, but
        // the rule is defined over the whole batch; the first URL is the
        // archive to download.
        let file_url = submit.file_urls.first().cloned();
        let task = Task::new_pending(
            generate_task_id(),
            submit.user_id.clone(),
            None,
            TaskType::Archive,
            file_url,
            None,
            submit.options.clone(),
        );
        vec![Dispatched { task }]
    } else {
        submit
            .file_urls
            .iter()
            .map(|url| Dispatched {
                task: Task::new_pending(
                    generate_task_id(),
                    submit.user_id.clone(),
                    None,
                    TaskType::Parse,
                    Some(url.clone()),
                    None,
                    submit.options.clone(),
                ),
            })
            .collect()
    }
}
