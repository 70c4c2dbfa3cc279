//! Relay routing rules
//!
//! `route` is a pure function from (sender role, message) to the set of
//! deliveries and the room-state change the message implies. It has no
//! access to sockets; the registry applies the result.

use couchpad_protocol::{Message, Role};
use serde_json::Value;

/// Display subtype that understands `dpad` natively
pub const TV_SUBTYPE: &str = "tv";

/// Which peers of the room receive a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Displays,
    /// Displays carrying this subtype
    Tagged(&'static str),
    /// Displays not carrying this subtype
    NotTagged(&'static str),
    Controllers,
    /// Only the connection the message came from
    Sender,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The inbound frame, byte for byte
    Verbatim,
    Replace(Message),
}

/// Last-write-wins room state mutation
#[derive(Debug, Clone, PartialEq)]
pub enum StateEffect {
    ActiveTab(Value),
    ActiveProfile(String),
    ActiveApp(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Route {
    pub effect: Option<StateEffect>,
    pub deliveries: Vec<(Audience, Payload)>,
}

impl Route {
    fn ignore() -> Self {
        Self::default()
    }

    fn to(audience: Audience) -> Self {
        Self {
            effect: None,
            deliveries: vec![(audience, Payload::Verbatim)],
        }
    }

    fn with_effect(mut self, effect: StateEffect) -> Self {
        self.effect = Some(effect);
        self
    }

    /// True when the message has no effect at all
    pub fn is_noop(&self) -> bool {
        self.effect.is_none() && self.deliveries.is_empty()
    }
}

/// Decide where a message goes
pub fn route(sender: Role, msg: &Message) -> Route {
    use Role::{Controller, Display};

    match (sender, msg) {
        (_, Message::Ping) => Route {
            effect: None,
            deliveries: vec![(Audience::Sender, Payload::Replace(Message::Pong))],
        },

        // Handled by the registry before routing; server-originated types are
        // never relayed back into the room.
        (_, Message::Join { .. })
        | (_, Message::Pong)
        | (_, Message::Status { .. })
        | (_, Message::Joined { .. })
        | (_, Message::Error { .. }) => Route::ignore(),

        (Controller, Message::Action { .. })
        | (Controller, Message::Mouse { .. })
        | (Controller, Message::Keyboard { .. })
        | (Controller, Message::Scroll { .. })
        | (Controller, Message::Gesture { .. })
        | (Controller, Message::Motion { .. })
        | (Controller, Message::OpenTab { .. })
        | (Controller, Message::GetTabs)
        | (Controller, Message::Volume { .. })
        | (Controller, Message::Voice { .. }) => Route::to(Audience::Displays),

        (Controller, Message::SwitchTab { tab_id }) => {
            Route::to(Audience::Displays).with_effect(StateEffect::ActiveTab(tab_id.clone()))
        }
        (Controller, Message::SetProfile { profile }) => Route::to(Audience::Displays)
            .with_effect(StateEffect::ActiveProfile(profile.clone())),
        (Controller, Message::LaunchApp { app_id }) => Route::to(Audience::Displays)
            .with_effect(StateEffect::ActiveApp(Some(app_id.clone()))),
        (Controller, Message::Home) => {
            Route::to(Audience::Displays).with_effect(StateEffect::ActiveApp(None))
        }

        (Controller, Message::Dpad { direction }) => Route {
            effect: None,
            deliveries: vec![
                (Audience::Tagged(TV_SUBTYPE), Payload::Verbatim),
                (
                    Audience::NotTagged(TV_SUBTYPE),
                    Payload::Replace(Message::action(direction.clone())),
                ),
            ],
        },

        (Display, Message::TabList { .. })
        | (Display, Message::ActiveTab { .. })
        | (Display, Message::ShowKeyboard)
        | (Display, Message::SiteDetected { .. })
        | (Display, Message::TvState { .. })
        | (Display, Message::NowPlaying { .. }) => Route::to(Audience::Controllers),

        // Wrong direction: controllers cannot address controllers and displays
        // cannot drive other displays.
        (Display, Message::Action { .. })
        | (Display, Message::Mouse { .. })
        | (Display, Message::Keyboard { .. })
        | (Display, Message::Scroll { .. })
        | (Display, Message::Gesture { .. })
        | (Display, Message::Motion { .. })
        | (Display, Message::OpenTab { .. })
        | (Display, Message::GetTabs)
        | (Display, Message::Volume { .. })
        | (Display, Message::Voice { .. })
        | (Display, Message::SwitchTab { .. })
        | (Display, Message::SetProfile { .. })
        | (Display, Message::LaunchApp { .. })
        | (Display, Message::Home)
        | (Display, Message::Dpad { .. })
        | (Controller, Message::TabList { .. })
        | (Controller, Message::ActiveTab { .. })
        | (Controller, Message::ShowKeyboard)
        | (Controller, Message::SiteDetected { .. })
        | (Controller, Message::TvState { .. })
        | (Controller, Message::NowPlaying { .. }) => Route::ignore(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_controller_input_fans_out_to_displays() {
        for msg in [
            Message::action("up"),
            Message::Scroll {
                delta_x: 0.0,
                delta_y: 4.0,
            },
            Message::Voice {
                query: "weather".to_string(),
            },
        ] {
            assert_eq!(route(Role::Controller, &msg), Route::to(Audience::Displays));
        }
    }

    #[test]
    fn test_display_feedback_goes_to_controllers() {
        let msg = Message::ActiveTab {
            tab: json!({"id": 3}),
            site_type: Some("video".to_string()),
        };
        assert_eq!(route(Role::Display, &msg), Route::to(Audience::Controllers));
        assert_eq!(
            route(Role::Display, &Message::ShowKeyboard),
            Route::to(Audience::Controllers)
        );
    }

    #[test]
    fn test_state_mutating_types() {
        let r = route(
            Role::Controller,
            &Message::SwitchTab {
                tab_id: json!(7),
            },
        );
        assert_eq!(r.effect, Some(StateEffect::ActiveTab(json!(7))));
        assert_eq!(r.deliveries, vec![(Audience::Displays, Payload::Verbatim)]);

        let r = route(
            Role::Controller,
            &Message::SetProfile {
                profile: "video".to_string(),
            },
        );
        assert_eq!(r.effect, Some(StateEffect::ActiveProfile("video".to_string())));

        let r = route(Role::Controller, &Message::Home);
        assert_eq!(r.effect, Some(StateEffect::ActiveApp(None)));
    }

    #[test]
    fn test_dpad_splits_on_subtype() {
        let r = route(
            Role::Controller,
            &Message::Dpad {
                direction: "left".to_string(),
            },
        );
        assert_eq!(
            r.deliveries,
            vec![
                (Audience::Tagged("tv"), Payload::Verbatim),
                (
                    Audience::NotTagged("tv"),
                    Payload::Replace(Message::action("left"))
                ),
            ]
        );
    }

    #[test]
    fn test_wrong_direction_is_dropped() {
        assert!(route(Role::Display, &Message::action("up")).is_noop());
        assert!(route(Role::Controller, &Message::ShowKeyboard).is_noop());
        assert!(route(
            Role::Controller,
            &Message::Status {
                controllers: 1,
                displays: 1
            }
        )
        .is_noop());
    }

    #[test]
    fn test_ping_answers_sender() {
        let r = route(Role::Display, &Message::Ping);
        assert_eq!(
            r.deliveries,
            vec![(Audience::Sender, Payload::Replace(Message::Pong))]
        );
    }
}
