//! The reply composer: assembles thread context into LLM messages and
//! post-processes the generated reply.

use asupersync::{Cx, Outcome};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use ghostpost_core::Config;
use ghostpost_db::timestamps::micros_to_display;
use ghostpost_db::{DbPool, queries};

use crate::error::EngineError;
use crate::llm;

/// Max conversation emails included in the prompt.
const MAX_CONVERSATION_EMAILS: usize = 10;

/// Max body characters per email in the prompt.
const MAX_PROMPT_BODY_CHARS: usize = 1000;

const STYLE_PROFESSIONAL: &str =
    "Write in a professional, clear business tone. Be polite but direct.";
const STYLE_CASUAL: &str = "Write in a friendly, casual tone. Keep it warm and approachable.";
const STYLE_FORMAL: &str =
    "Write in a formal, respectful tone. Use proper salutations and sign-offs.";

macro_rules! try_db {
    ($out:expr) => {
        match $out {
            Outcome::Ok(v) => v,
            Outcome::Err(e) => return Outcome::Err(EngineError::Db(e)),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
    };
}

/// A generated reply ready for the send gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyDraft {
    pub body: String,
    pub style: String,
    pub subject: String,
    pub to: String,
}

/// Display name the reply is signed with, derived from the configured
/// mailbox address.
fn owner_display(config: &Config) -> String {
    let local = config.own_email.split('@').next().unwrap_or("");
    if local.is_empty() {
        return "the mailbox owner".to_string();
    }
    let mut chars = local.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().collect::<String>() + chars.as_str()
    })
}

async fn resolve_style_prompt(
    cx: &Cx,
    pool: &DbPool,
    style: &str,
) -> Outcome<String, EngineError> {
    let prompt = match style {
        "casual" => STYLE_CASUAL.to_string(),
        "formal" => STYLE_FORMAL.to_string(),
        "custom" => {
            let custom = try_db!(queries::get_setting(cx, pool, "reply_style_custom").await);
            custom
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| STYLE_PROFESSIONAL.to_string())
        }
        _ => STYLE_PROFESSIONAL.to_string(),
    };
    Outcome::Ok(prompt)
}

/// Generate a reply for a thread using the LLM.
///
/// Errors map to the user-visible strings "LLM not available", "Thread not
/// found" and "No emails in thread".
pub async fn generate_reply(
    cx: &Cx,
    pool: &DbPool,
    config: &Config,
    thread_id: i64,
    instructions: Option<&str>,
    style_override: Option<&str>,
) -> Outcome<ReplyDraft, EngineError> {
    if !config.llm_enabled || !llm::llm_available() {
        return Outcome::Err(EngineError::LlmNotAvailable);
    }

    let thread = match queries::get_thread(cx, pool, thread_id).await {
        Outcome::Ok(thread) => thread,
        Outcome::Err(e) if e.is_not_found() => {
            return Outcome::Err(EngineError::ThreadNotFound);
        }
        Outcome::Err(e) => return Outcome::Err(EngineError::Db(e)),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };

    let emails = try_db!(queries::list_thread_emails(cx, pool, thread_id).await);
    let Some(last_email) = emails.last() else {
        return Outcome::Err(EngineError::NoEmailsInThread);
    };
    let recipient = last_email.from_address.clone();

    let contact = if recipient.is_empty() {
        None
    } else {
        try_db!(queries::get_contact_by_email(cx, pool, &recipient).await)
    };

    // Style: explicit override, then the reply_style setting.
    let style = if let Some(style) = style_override {
        style.to_string()
    } else {
        try_db!(queries::get_setting_or_default(cx, pool, "reply_style").await)
            .unwrap_or_else(|| "professional".to_string())
    };
    let style_prompt = match resolve_style_prompt(cx, pool, &style).await {
        Outcome::Ok(p) => p,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };

    // Conversation context: the last 10 emails, bodies capped to stay
    // within the token budget.
    let start = emails.len().saturating_sub(MAX_CONVERSATION_EMAILS);
    let conversation: Vec<String> = emails[start..]
        .iter()
        .map(|email| {
            let direction = if email.is_sent_bool() { "SENT" } else { "RECEIVED" };
            let body: String = email
                .body_plain
                .as_deref()
                .unwrap_or("")
                .chars()
                .take(MAX_PROMPT_BODY_CHARS)
                .collect();
            let date = email
                .date
                .map_or_else(|| "unknown".to_string(), micros_to_display);
            format!("[{direction}] From: {} ({date})\n{body}", email.from_address)
        })
        .collect();
    let conv_text = conversation.join("\n---\n");

    let mut contact_context = String::new();
    if let Some(contact) = &contact {
        contact_context = format!(
            "\nContact info: {}",
            contact.name.as_deref().unwrap_or("Unknown")
        );
        if let Some(style) = &contact.preferred_style {
            let _ = write!(contact_context, ", prefers {style} communication");
        }
        if let Some(rel) = contact
            .relationship_type
            .as_deref()
            .filter(|r| *r != "unknown")
        {
            let _ = write!(contact_context, ", relationship: {rel}");
        }
    }

    let owner = owner_display(config);
    let system = format!(
        "You are writing an email reply on behalf of {owner}.\n\
         {style_prompt}\n\
         \n\
         RULES:\n\
         - Write ONLY the reply body text — no subject line, no headers, no \"From:\" lines\n\
         - Do NOT include greeting lines like \"Dear...\" unless the style is formal\n\
         - Keep it concise and on-topic\n\
         - Match the language of the conversation (if they write in Portuguese, reply in \
         Portuguese)\n\
         - Sign off with just \"{owner}\" if appropriate for the style\n\
         {contact_context}"
    );

    let mut user_msg = format!("Thread subject: {}\n", thread.subject);
    if let Some(goal) = &thread.goal {
        let _ = writeln!(user_msg, "Goal: {goal}");
    }
    if let Some(playbook) = &thread.playbook {
        let _ = writeln!(user_msg, "Active playbook: {playbook}");
    }
    if let Some(instructions) = instructions {
        let _ = writeln!(user_msg, "\nSpecific instructions: {instructions}");
    }
    let _ = write!(
        user_msg,
        "\nConversation:\n{conv_text}\n\nWrite a reply to the most recent email."
    );

    let body = match llm::complete(&system, &user_msg, &config.llm_model, 1024, 0.4).await {
        Ok(body) => body.trim().to_string(),
        Err(e) => {
            tracing::error!(thread_id, error = %e, "failed to generate reply");
            return Outcome::Err(EngineError::Llm(e.to_string()));
        }
    };

    // Single Re: prefix on the subject.
    let subject = if last_email.subject.to_lowercase().starts_with("re:") {
        last_email.subject.clone()
    } else {
        format!("Re: {}", last_email.subject)
    };

    Outcome::Ok(ReplyDraft {
        body,
        style,
        subject,
        to: recipient,
    })
}
