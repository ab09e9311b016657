//! Folding of streamed chat chunks into one response.

use super::dto::{ChatResponse, Message};

fn concat(previous: Option<String>, current: Option<String>) -> Option<String> {
    match (previous, current) {
        (Some(p), Some(c)) => Some(p + &c),
        (p, c) => p.or(c),
    }
}

fn sum(previous: Option<u64>, current: Option<u64>) -> Option<u64> {
    match (previous, current) {
        (Some(p), Some(c)) => Some(p + c),
        (p, c) => p.or(c),
    }
}

fn extend<T>(previous: Option<Vec<T>>, current: Option<Vec<T>>) -> Option<Vec<T>> {
    match (previous, current) {
        (Some(mut p), Some(c)) => {
            p.extend(c);
            Some(p)
        }
        (p, c) => p.or(c),
    }
}

fn merge_message(previous: Option<Message>, current: Option<Message>) -> Option<Message> {
    match (previous, current) {
        (Some(p), Some(c)) => Some(Message {
            role: c.role,
            content: p.content + &c.content,
            images: extend(p.images, c.images),
            tool_calls: extend(p.tool_calls, c.tool_calls),
            tool_name: c.tool_name.or(p.tool_name),
            thinking: concat(p.thinking, c.thinking),
        }),
        (p, c) => p.or(c),
    }
}

/// Merge `current` into `previous`, applied left to right in arrival order.
///
/// Text, thinking, images and tool calls accumulate; token counts and durations are
/// summed; `model`, `created_at`, `done` and `done_reason` take the latest non-null value.
pub fn merge(previous: ChatResponse, current: ChatResponse) -> ChatResponse {
    ChatResponse {
        model: current.model.or(previous.model),
        created_at: current.created_at.or(previous.created_at),
        message: merge_message(previous.message, current.message),
        done_reason: current.done_reason.or(previous.done_reason),
        done: current.done.or(previous.done),
        total_duration: sum(previous.total_duration, current.total_duration),
        load_duration: sum(previous.load_duration, current.load_duration),
        prompt_eval_count: sum(previous.prompt_eval_count, current.prompt_eval_count),
        prompt_eval_duration: sum(previous.prompt_eval_duration, current.prompt_eval_duration),
        eval_count: sum(previous.eval_count, current.eval_count),
        eval_duration: sum(previous.eval_duration, current.eval_duration),
    }
}
