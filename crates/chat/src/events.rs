use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use slotbot_core::{ActionKey, ApplicationError, UserId};
use thiserror::Error;
use tracing::warn;

use crate::{
    commands::{
        infer_text_command, normalize_command, parse_command_text, CommandEnvelope,
        CommandParseError, CommandPayload, CommandRouter, GameCommandService,
    },
    guard::{GuardVerdict, ThrottleGuard},
    messages::{error_message, MessageTemplate},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatEnvelope {
    pub update_id: String,
    pub event: ChatEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    Command(CommandPayload),
    Text(TextMessageEvent),
    Unsupported { event_type: String },
}

impl ChatEvent {
    pub fn event_type(&self) -> ChatEventType {
        match self {
            Self::Command(_) => ChatEventType::Command,
            Self::Text(_) => ChatEventType::Text,
            Self::Unsupported { .. } => ChatEventType::Unsupported,
        }
    }

    pub fn chat_id(&self) -> Option<&str> {
        match self {
            Self::Command(payload) => Some(&payload.chat_id),
            Self::Text(event) => Some(&event.chat_id),
            Self::Unsupported { .. } => None,
        }
    }

    /// User and throttle key this event is charged against, if it is throttled at all.
    pub fn throttle_target(&self) -> Option<(UserId, ActionKey)> {
        match self {
            Self::Command(payload) => {
                let (command, _) = parse_command_text(&payload.text).ok()?;
                Some((UserId::from(payload.user_id.as_str()), command.action_key()?))
            }
            Self::Text(event) => {
                let command = infer_text_command(&event.text)?;
                Some((UserId::from(event.user_id.as_str()), command.action_key()?))
            }
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChatEventType {
    Command,
    Text,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMessageEvent {
    pub chat_id: String,
    pub user_id: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(MessageTemplate),
    Processed,
    Ignored,
    /// Rejected by the throttle; carries the notice for the first rejection of a burst.
    Throttled(Option<MessageTemplate>),
}

impl HandlerResult {
    pub fn reply(&self) -> Option<&MessageTemplate> {
        match self {
            Self::Responded(message) | Self::Throttled(Some(message)) => Some(message),
            Self::Processed | Self::Ignored | Self::Throttled(None) => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> ChatEventType;
    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<ChatEventType, Arc<dyn EventHandler>>,
    guard: Option<ThrottleGuard>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_guard(guard: ThrottleGuard) -> Self {
        Self { handlers: HashMap::new(), guard: Some(guard) }
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    /// Consults the throttle guard before the handler for throttled events.
    pub async fn dispatch(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        if let Some(settled) = self.screen(envelope, ctx) {
            return Ok(settled);
        }
        self.run_handler(envelope, ctx).await
    }

    /// Settles `envelope` without running a handler: unhandled event types are ignored and
    /// throttled events get their verdict. `None` means the envelope goes to `run_handler`.
    ///
    /// The guard records the call here, so the throttle sees updates in arrival order even
    /// when handlers run concurrently.
    pub fn screen(&self, envelope: &ChatEnvelope, ctx: &EventContext) -> Option<HandlerResult> {
        if !self.handlers.contains_key(&envelope.event.event_type()) {
            return Some(HandlerResult::Ignored);
        }

        let (Some(guard), Some((user_id, action))) = (&self.guard, envelope.event.throttle_target())
        else {
            return None;
        };

        match guard.check(&user_id, action, &ctx.correlation_id) {
            GuardVerdict::Proceed => None,
            GuardVerdict::Notify(notice) => Some(HandlerResult::Throttled(Some(notice))),
            GuardVerdict::Drop => Some(HandlerResult::Throttled(None)),
        }
    }

    /// Runs the registered handler without consulting the guard.
    pub async fn run_handler(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn guard(&self) -> Option<&ThrottleGuard> {
        self.guard.as_ref()
    }
}

/// Dispatcher with the command and spin-button handlers wired to one game service.
pub fn game_dispatcher<S>(service: Arc<S>, guard: Option<ThrottleGuard>) -> EventDispatcher
where
    S: GameCommandService + 'static,
{
    let mut dispatcher = match guard {
        Some(guard) => EventDispatcher::with_guard(guard),
        None => EventDispatcher::new(),
    };
    dispatcher.register(CommandHandler::new(service.clone()));
    dispatcher.register(TextMessageHandler::new(service));
    dispatcher
}

fn respond_or_render_error(
    routed: Result<MessageTemplate, ApplicationError>,
    ctx: &EventContext,
) -> HandlerResult {
    match routed {
        Ok(message) => HandlerResult::Responded(message),
        Err(error) => {
            warn!(
                event_name = "chat.command.failed",
                correlation_id = %ctx.correlation_id,
                error = %error,
                "command failed; replying with error message"
            );
            let interface = error.into_interface(ctx.correlation_id.clone());
            HandlerResult::Responded(error_message(&interface))
        }
    }
}

pub struct CommandHandler<S> {
    router: CommandRouter<S>,
}

impl<S> CommandHandler<S>
where
    S: GameCommandService,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { router: CommandRouter::new(service) }
    }
}

#[async_trait]
impl<S> EventHandler for CommandHandler<S>
where
    S: GameCommandService + 'static,
{
    fn event_type(&self) -> ChatEventType {
        ChatEventType::Command
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::Command(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let normalized = normalize_command(payload.clone())?;
        Ok(respond_or_render_error(self.router.route(&normalized).await, ctx))
    }
}

pub struct TextMessageHandler<S> {
    router: CommandRouter<S>,
}

impl<S> TextMessageHandler<S>
where
    S: GameCommandService,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { router: CommandRouter::new(service) }
    }
}

#[async_trait]
impl<S> EventHandler for TextMessageHandler<S>
where
    S: GameCommandService + 'static,
{
    fn event_type(&self) -> ChatEventType {
        ChatEventType::Text
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::Text(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let Some(command) = infer_text_command(&event.text) else {
            return Ok(HandlerResult::Processed);
        };

        let envelope = CommandEnvelope {
            command,
            args: String::new(),
            chat_id: event.chat_id.clone(),
            user_id: UserId::from(event.user_id.as_str()),
            request_id: ctx.correlation_id.clone(),
        };
        Ok(respond_or_render_error(self.router.route(&envelope).await, ctx))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use slotbot_core::{
        ActionKey, ActionThrottle, ApplicationError, ComboError, CooldownTable, ManualClock, UserId,
    };

    use super::{
        game_dispatcher, ChatEnvelope, ChatEvent, DispatchError, EventContext, EventDispatcher,
        EventHandlerError, HandlerResult, TextMessageEvent,
    };
    use crate::commands::{CommandEnvelope, CommandParseError, CommandPayload, GameCommandService};
    use crate::guard::ThrottleGuard;
    use crate::messages::{MessageBuilder, MessageTemplate, SPIN_BUTTON_TEXT};

    #[derive(Default)]
    struct CountingService {
        spins: AtomicUsize,
        fail_spin: bool,
    }

    #[async_trait]
    impl GameCommandService for CountingService {
        async fn start(&self, _envelope: &CommandEnvelope) -> Result<MessageTemplate, ApplicationError> {
            Ok(MessageBuilder::new("started").build())
        }

        async fn spin(&self, _envelope: &CommandEnvelope) -> Result<MessageTemplate, ApplicationError> {
            self.spins.fetch_add(1, Ordering::SeqCst);
            if self.fail_spin {
                return Err(ComboError::OutOfRange { raw: 65 }.into());
            }
            Ok(MessageBuilder::new("spun").build())
        }
    }

    fn command(update_id: &str, user_id: &str, text: &str) -> ChatEnvelope {
        ChatEnvelope {
            update_id: update_id.to_owned(),
            event: ChatEvent::Command(CommandPayload {
                chat_id: "100".to_owned(),
                user_id: user_id.to_owned(),
                text: text.to_owned(),
                request_id: update_id.to_owned(),
            }),
        }
    }

    fn text(update_id: &str, user_id: &str, body: &str) -> ChatEnvelope {
        ChatEnvelope {
            update_id: update_id.to_owned(),
            event: ChatEvent::Text(TextMessageEvent {
                chat_id: "100".to_owned(),
                user_id: user_id.to_owned(),
                text: body.to_owned(),
            }),
        }
    }

    fn ctx(id: &str) -> EventContext {
        EventContext { correlation_id: id.to_owned() }
    }

    fn guarded(service: Arc<CountingService>) -> (EventDispatcher, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let guard = ThrottleGuard::new(
            Arc::new(ActionThrottle::new(CooldownTable::default())),
            clock.clone(),
        );
        (game_dispatcher(service, Some(guard)), clock)
    }

    #[test]
    fn throttle_target_follows_command_kind() {
        let spin = command("1", "u1", "/spin");
        let help = command("2", "u1", "/help");
        let unknown = command("3", "u1", "/jackpot");
        let button = text("4", "u1", SPIN_BUTTON_TEXT);
        let chatter = text("5", "u1", "hello");

        assert_eq!(spin.event.throttle_target(), Some((UserId::from("u1"), ActionKey::Spin)));
        assert_eq!(help.event.throttle_target(), Some((UserId::from("u1"), ActionKey::Default)));
        assert_eq!(unknown.event.throttle_target(), None);
        assert_eq!(button.event.throttle_target(), Some((UserId::from("u1"), ActionKey::Spin)));
        assert_eq!(chatter.event.throttle_target(), None);
    }

    #[tokio::test]
    async fn dispatcher_routes_commands_and_spin_button() {
        let service = Arc::new(CountingService::default());
        let dispatcher = game_dispatcher(service.clone(), None);

        let result = dispatcher.dispatch(&command("1", "u1", "/start"), &ctx("1")).await;
        assert_eq!(result.expect("dispatch").reply().map(|m| m.fallback_text.as_str()), Some("started"));

        let result = dispatcher.dispatch(&text("2", "u1", SPIN_BUTTON_TEXT), &ctx("2")).await;
        assert_eq!(result.expect("dispatch").reply().map(|m| m.fallback_text.as_str()), Some("spun"));
        assert_eq!(service.spins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispatcher_marks_plain_chatter_processed() {
        let dispatcher = game_dispatcher(Arc::new(CountingService::default()), None);

        let result = dispatcher.dispatch(&text("1", "u1", "good luck"), &ctx("1")).await;

        assert_eq!(result.expect("dispatch"), HandlerResult::Processed);
    }

    #[tokio::test]
    async fn dispatcher_ignores_unsupported_events() {
        let dispatcher = game_dispatcher(Arc::new(CountingService::default()), None);
        let envelope = ChatEnvelope {
            update_id: "1".to_owned(),
            event: ChatEvent::Unsupported { event_type: "edited_message".to_owned() },
        };

        let result = dispatcher.dispatch(&envelope, &ctx("1")).await;

        assert_eq!(result.expect("dispatch"), HandlerResult::Ignored);
    }

    #[tokio::test]
    async fn throttled_spin_never_reaches_the_service() {
        let service = Arc::new(CountingService::default());
        let (dispatcher, clock) = guarded(service.clone());

        let first = dispatcher.dispatch(&command("1", "u1", "/spin"), &ctx("1")).await;
        assert!(matches!(first.expect("dispatch"), HandlerResult::Responded(_)));

        clock.advance(Duration::from_millis(1_000));
        let second = dispatcher.dispatch(&text("2", "u1", SPIN_BUTTON_TEXT), &ctx("2")).await;
        let HandlerResult::Throttled(Some(notice)) = second.expect("dispatch") else {
            panic!("expected throttle notice");
        };
        assert!(notice.fallback_text.contains("Too many requests"));

        let third = dispatcher.dispatch(&command("3", "u1", "/spin"), &ctx("3")).await;
        assert_eq!(third.expect("dispatch"), HandlerResult::Throttled(None));

        assert_eq!(service.spins.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_millis(1_000));
        let fourth = dispatcher.dispatch(&command("4", "u1", "/spin"), &ctx("4")).await;
        assert!(matches!(fourth.expect("dispatch"), HandlerResult::Responded(_)));
        assert_eq!(service.spins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn default_and_spin_keys_are_throttled_independently() {
        let (dispatcher, _clock) = guarded(Arc::new(CountingService::default()));

        let spin = dispatcher.dispatch(&command("1", "u1", "/spin"), &ctx("1")).await;
        let help = dispatcher.dispatch(&command("2", "u1", "/help"), &ctx("2")).await;
        let other_user = dispatcher.dispatch(&command("3", "u2", "/spin"), &ctx("3")).await;

        assert!(matches!(spin.expect("dispatch"), HandlerResult::Responded(_)));
        assert!(matches!(help.expect("dispatch"), HandlerResult::Responded(_)));
        assert!(matches!(other_user.expect("dispatch"), HandlerResult::Responded(_)));
    }

    #[tokio::test]
    async fn service_failure_becomes_error_reply_with_correlation_id() {
        let service = Arc::new(CountingService { fail_spin: true, ..CountingService::default() });
        let dispatcher = game_dispatcher(service, None);

        let result = dispatcher.dispatch(&command("9", "u1", "/spin"), &ctx("upd-9")).await;
        let reply = result.expect("dispatch");
        let text = reply.reply().expect("error reply").render_plain();

        assert!(text.contains("dice value 65"));
        assert!(text.contains("Correlation ID: upd-9"));
    }

    #[tokio::test]
    async fn malformed_command_surfaces_parse_error() {
        let dispatcher = game_dispatcher(Arc::new(CountingService::default()), None);

        let result = dispatcher.dispatch(&command("1", "u1", "/"), &ctx("1")).await;

        assert_eq!(
            result,
            Err(DispatchError::Handler(EventHandlerError::Parse(CommandParseError::EmptyCommand)))
        );
    }

    #[tokio::test]
    async fn screen_records_spins_before_any_handler_runs() {
        let service = Arc::new(CountingService::default());
        let (dispatcher, _clock) = guarded(service.clone());
        let first = command("1", "u1", "/spin");
        let second = command("2", "u1", "/spin");

        assert_eq!(dispatcher.screen(&first, &ctx("1")), None);
        let Some(HandlerResult::Throttled(Some(_))) = dispatcher.screen(&second, &ctx("2")) else {
            panic!("second spin should be throttled while the first is still pending");
        };
        assert_eq!(service.spins.load(Ordering::SeqCst), 0);

        let result = dispatcher.run_handler(&first, &ctx("1")).await;
        assert!(matches!(result.expect("handler"), HandlerResult::Responded(_)));
        assert_eq!(service.spins.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn screen_ignores_unhandled_event_types() {
        let dispatcher = EventDispatcher::new();
        let envelope = command("1", "u1", "/spin");

        assert_eq!(dispatcher.screen(&envelope, &ctx("1")), Some(HandlerResult::Ignored));
    }

    #[test]
    fn game_dispatcher_registers_both_handlers() {
        let dispatcher = game_dispatcher(Arc::new(CountingService::default()), None);
        assert_eq!(dispatcher.handler_count(), 2);
        assert!(dispatcher.guard().is_none());
    }
}
