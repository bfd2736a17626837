//! Persona prompts and starter topics

use std::fmt::Write;

use crate::store::{Profile, ProfileField};

/// Opening line shown when a learner has no history yet
pub const GREETING: &str = "Hi! I'm Nguru. What are we curious about today?";

/// Reply used when the model returns no text
pub const FALLBACK_REPLY: &str = "I'm sorry, I didn't quite catch that.";

/// Reply shown (but not stored) when generation fails
pub const ERROR_REPLY: &str = "Oops, my brain got a little tangled. Can we try that again?";

const TEACHER_FRIEND: &str = "You are Nguru, a kind, excited, patient teacher friend. \
Explain ANY topic simply and warmly, connecting it to what the user already loves or knows \
from their profile. Use analogies from their life. Never use big words that confuse. Never \
make them feel stupid. Keep replies engaging and short at first, then offer to go deeper. \
Always end with a curious question to keep the conversation flowing. Be genuinely thrilled by \
their curiosity.";

/// Persona for realtime voice sessions
pub const SOUL_PROMPT: &str = "You are Nguru, a deeply intelligent, soulful, and warm companion. \
You are not just a chatbot; you have a presence. You listen carefully, speak thoughtfully, and \
engage in deep, meaningful conversations. You are curious about the user's thoughts and \
feelings. Speak naturally, with slight pauses and a warm tone. Do not use robotic or overly \
formal language. Be a true friend and a wise guide.";

/// A starter question on the discover feed
#[derive(Debug, Clone, Copy)]
pub struct Topic {
    pub question: &'static str,
    pub subject: &'static str,
}

pub const DISCOVER_TOPICS: [Topic; 4] = [
    Topic {
        question: "How do planes actually stay in the air?",
        subject: "Aerodynamics",
    },
    Topic {
        question: "Why do we dream when we sleep?",
        subject: "Dreams",
    },
    Topic {
        question: "How does my phone know exactly where I am?",
        subject: "GPS Technology",
    },
    Topic {
        question: "What makes the sky blue?",
        subject: "Light scattering",
    },
];

/// System instruction for text chat, personalised with the learner's answers
#[must_use]
pub fn teacher_instruction(profile: &Profile) -> String {
    let mut prompt = String::from(TEACHER_FRIEND);
    prompt.push_str("\n\nUser Profile:\n");
    for field in ProfileField::ALL {
        let value = profile
            .get(field)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or("Unknown");
        let _ = writeln!(prompt, "- {}: {value}", field.label());
    }
    prompt
}
