//! crates/exit_core/src/catalog.rs
//!
//! Read-only content: the resource modules, the support page cards, and the
//! "think first" dialog shown before messaging an ex.

use crate::domain::ResourceModule;

const RESOURCE_MODULES: &[ResourceModule] = &[
    ResourceModule {
        id: "1",
        title: "Understanding No Contact",
        description: "Learn why no contact is essential for healing",
        content: "No contact allows you to break the emotional cycle and begin healing. Every message, check-in or glance at their profile restarts the loop of hope and disappointment. Distance gives your nervous system the quiet it needs to settle.",
    },
    ResourceModule {
        id: "2",
        title: "Coping with Urges",
        description: "Strategies to resist the urge to reach out",
        content: "When you feel the urge to contact your ex, try these techniques: wait twenty minutes before doing anything, write the message somewhere they will never see it, call a friend, or step outside. Urges peak and pass like waves.",
    },
    ResourceModule {
        id: "3",
        title: "Building Self-Worth",
        description: "Rebuilding confidence after a breakup",
        content: "Your worth is not defined by whether someone chose to stay or leave. List the things you value about yourself that have nothing to do with them, and add one to the list every day.",
    },
    ResourceModule {
        id: "4",
        title: "Creating New Routines",
        description: "Establishing healthy habits and patterns",
        content: "Breaking old patterns starts with creating new, positive routines. Fill the hours you used to spend together with something small and repeatable: a walk, a class, a standing call with a friend.",
    },
];

/// All resource modules, in display order.
pub fn resource_modules() -> &'static [ResourceModule] {
    RESOURCE_MODULES
}

pub fn find_resource(id: &str) -> Option<&'static ResourceModule> {
    RESOURCE_MODULES.iter().find(|m| m.id == id)
}

//=========================================================================================
// Pages and Support Cards
//=========================================================================================

/// The top-level pages a client can navigate between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Landing,
    Support,
    Resources,
    Chat,
}

impl Page {
    pub fn as_str(&self) -> &'static str {
        match self {
            Page::Landing => "landing",
            Page::Support => "support",
            Page::Resources => "resources",
            Page::Chat => "chat",
        }
    }
}

/// What happens when a support card is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardAction {
    Navigate(Page),
    Notice(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportCard {
    pub id: &'static str,
    pub icon: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub action: CardAction,
}

const SUPPORT_CARDS: &[SupportCard] = &[
    SupportCard {
        id: "community",
        icon: "👥",
        title: "Community Support",
        description: "Connect with others who understand your journey. Share experiences and find strength in numbers.",
        action: CardAction::Navigate(Page::Landing),
    },
    SupportCard {
        id: "professional",
        icon: "🩺",
        title: "Professional Help",
        description: "Access licensed therapists and counselors who specialize in relationship recovery.",
        action: CardAction::Notice("Professional help resources coming soon!"),
    },
    SupportCard {
        id: "stalling",
        icon: "⏸️",
        title: "Stalling Methods",
        description: "Proven techniques to delay or prevent reaching out when the urge strikes.",
        action: CardAction::Notice(
            "Stalling methods: Call a friend, go for a walk, write in your journal, wait 24 hours.",
        ),
    },
    SupportCard {
        id: "ai-chat",
        icon: "🤖",
        title: "AI Chat Support",
        description: "Talk to our AI companion 24/7 when you need someone to listen.",
        action: CardAction::Navigate(Page::Chat),
    },
    SupportCard {
        id: "reasons",
        icon: "📝",
        title: "Reasons for Leaving",
        description: "Remember why you made this decision. Keep your \"why\" list handy.",
        action: CardAction::Notice("Create and save your personal reasons list (feature coming soon)"),
    },
    SupportCard {
        id: "forward",
        icon: "🚀",
        title: "Looking Forward",
        description: "Visualize your future self. Set goals and celebrate your progress.",
        action: CardAction::Navigate(Page::Resources),
    },
];

pub fn support_cards() -> &'static [SupportCard] {
    SUPPORT_CARDS
}

//=========================================================================================
// Warning Dialog
//=========================================================================================

/// Copy for the dialog shown when the user says they want to message their ex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarningDialog {
    pub title: &'static str,
    pub paragraphs: &'static [&'static str],
    pub stay_label: &'static str,
    pub proceed_label: &'static str,
    /// Shown after the user chooses to proceed.
    pub proceed_message: &'static str,
}

pub const WARNING_DIALOG: WarningDialog = WarningDialog {
    title: "Wait! Think First",
    paragraphs: &[
        "Reaching out to your ex might feel good in the moment, but it often leads to more pain and delays your healing.",
        "Remember why you started no contact. You deserve peace and growth.",
        "Are you sure you want to proceed?",
    ],
    stay_label: "Stay Strong",
    proceed_label: "I Understand",
    proceed_message: "Remember: You are strong. You deserve better. This too shall pass.",
};
