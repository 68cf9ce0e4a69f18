//! Relative prompt assembly.
//!
//! Walks relative preset fragments in **document order** — no re-sorting —
//! and expands named slots into the final flat message list. The relative
//! frame is purely additive scaffolding: with no enabled relative fragments
//! the (already depth-injected) history passes through untouched.

use crate::{history_text, source_fields};
use loreloom_core::fragment::{
    Character, FragmentPosition, Persona, PromptFragment, TriggerMode, WorldBookEntry,
    WorldBookPosition,
};
use loreloom_core::message::{Message, Role, Source, SourceKind};
use tracing::debug;

/// Collaborating documents for slot expansion.
#[derive(Default)]
pub struct AssemblyInputs<'a> {
    pub world_book: &'a [WorldBookEntry],
    pub character: Option<&'a Character>,
    pub persona: Option<&'a Persona>,
}

/// Assemble the relative frame around the history.
pub fn assemble(
    history: &[Message],
    fragments: &[PromptFragment],
    inputs: &AssemblyInputs<'_>,
) -> Vec<Message> {
    let enabled: Vec<&PromptFragment> = fragments
        .iter()
        .filter(|f| f.position == FragmentPosition::Relative && f.enabled_relative())
        .collect();

    if enabled.is_empty() {
        return history.to_vec();
    }

    let text = history_text(history);
    let mut out = Vec::with_capacity(history.len() + enabled.len());

    for (internal_order, fragment) in enabled.iter().enumerate() {
        match fragment.identifier.as_deref() {
            Some("chatHistory") => out.extend(history.iter().cloned()),
            Some("charBefore") => {
                out.extend(world_book_block(inputs.world_book, WorldBookPosition::BeforeChar, &text))
            }
            Some("charAfter") => {
                out.extend(world_book_block(inputs.world_book, WorldBookPosition::AfterChar, &text))
            }
            Some("charDescription") => {
                if let Some(character) = inputs.character {
                    if !character.description.trim().is_empty() {
                        out.push(Message::new(
                            Role::System,
                            character.description.clone(),
                            Source::char_description(),
                        ));
                    }
                }
            }
            Some("personaDescription") => {
                if let Some(persona) = inputs.persona {
                    if !persona.description.trim().is_empty() {
                        out.push(Message::new(
                            Role::System,
                            persona.description.clone(),
                            Source::persona_description(),
                        ));
                    }
                }
            }
            _ => {
                if fragment.content.trim().is_empty() {
                    debug!(id = ?fragment.id, "skipping blank relative fragment");
                    continue;
                }
                let mut source =
                    Source::preset(SourceKind::PresetRelative, source_fields(*fragment, &[]));
                source.source_id = fragment.id.clone();
                source.internal_order = Some(internal_order);
                out.push(Message::new(
                    fragment.role.unwrap_or(Role::System),
                    fragment.content.clone(),
                    source,
                ));
            }
        }
    }

    out
}

/// Expand one world-book block (`charBefore` / `charAfter`).
fn world_book_block(
    entries: &[WorldBookEntry],
    position: WorldBookPosition,
    history_text: &str,
) -> Vec<Message> {
    let kind = match position {
        WorldBookPosition::BeforeChar => SourceKind::WorldBookBeforeChar,
        WorldBookPosition::AfterChar => SourceKind::WorldBookAfterChar,
        WorldBookPosition::InChat => return Vec::new(),
    };

    let mut qualifying: Vec<(i64, u8, usize, &WorldBookEntry)> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.position == position && e.is_enabled())
        .filter(|(_, e)| !e.content.trim().is_empty())
        .filter(|(_, e)| match e.mode {
            TriggerMode::Always => true,
            // Case-sensitive substring matching against history content.
            TriggerMode::Conditional => e.keys.iter().any(|k| history_text.contains(k.as_str())),
        })
        .map(|(i, e)| (e.order.unwrap_or(100), e.effective_role().priority(), i, e))
        .collect();

    qualifying.sort_by_key(|(order, priority, internal, _)| (*order, *priority, *internal));

    qualifying
        .into_iter()
        .map(|(order, _, internal, entry)| {
            let role = entry.effective_role();
            let mut source = Source::world_book(kind, entry.id.clone(), source_fields(entry, &["id"]));
            source.order = Some(order);
            source.role = Some(role);
            source.internal_order = Some(internal);
            Message::new(role, entry.content.clone(), source)
        })
        .collect()
}
