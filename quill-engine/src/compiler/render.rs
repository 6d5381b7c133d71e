//! Step renderer
//!
//! One walk over the document renders exactly one step. Steps before the
//! target are replayed: their expressions run so that assignments and `as`
//! bindings reach later steps, but nothing they produce is kept. The target
//! step is collected into messages. After the target the walk only probes
//! whether anything else would be sent, and stops at the first sign of it.

use crate::compiler::ChainOptions;
use crate::error::{CompileError, CompileResult, EvalError};
use crate::logic::evaluate;
use crate::scope::{Parameters, Scope};
use quill_core::{ContentPart, Message, Role, ToolCall, ToolResult, Value};
use quill_dsl::{
    Attribute, AttributeValue, Document, EachBlock, Element, IfBlock, Node, Span, TagName,
};
use std::collections::BTreeMap;
use tracing::trace;

/// Output of rendering one step.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RenderedStep {
    pub messages: Vec<Message>,
    /// Config keys set on the step tag.
    pub overrides: BTreeMap<String, serde_json::Value>,
    pub is_last_step: bool,
    /// The step tag binds the model's answer with `as`.
    pub binds_response: bool,
    /// False when the document ran out before the requested step.
    pub found: bool,
}

/// Render step `target` of `document`. `responses[i]` is the text the model
/// answered step `i` with; it feeds `as` bindings while replaying.
pub(crate) fn render_step(
    document: &Document,
    parameters: &Parameters,
    options: &ChainOptions,
    target: usize,
    responses: &[String],
) -> CompileResult<RenderedStep> {
    let mut renderer = Renderer::new(parameters.clone(), options, target, responses);
    let flow = renderer.walk_nodes(&document.nodes)?;
    if flow == Flow::Continue {
        renderer.flush_loose();
    }

    let (found, is_last_step) = match renderer.mode {
        // Content after the last step tag forms an implicit final step.
        Mode::Collect => (target == 0 || !renderer.messages.is_empty(), true),
        Mode::Probe => (true, !renderer.more_steps),
        Mode::Replay => (false, true),
    };

    Ok(RenderedStep {
        messages: renderer.messages,
        overrides: renderer.overrides,
        is_last_step,
        binds_response: renderer.binds_response,
        found,
    })
}

// ============================================================================
// RENDERER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Replay,
    Collect,
    Probe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Halt,
}

/// A message tag whose children are being rendered.
#[derive(Debug)]
struct OpenMessage {
    role: Role,
    parts: Vec<ContentPart>,
}

struct Renderer<'a> {
    scope: Scope,
    options: &'a ChainOptions,
    responses: &'a [String],
    target: usize,
    step: usize,
    mode: Mode,
    messages: Vec<Message>,
    /// Content outside any message tag, waiting to become a message.
    loose: Vec<ContentPart>,
    open: Option<OpenMessage>,
    /// Text captured for a content tag or `<tool>` body.
    capture: Option<String>,
    in_step: bool,
    overrides: BTreeMap<String, serde_json::Value>,
    binds_response: bool,
    more_steps: bool,
}

impl<'a> Renderer<'a> {
    fn new(
        parameters: Parameters,
        options: &'a ChainOptions,
        target: usize,
        responses: &'a [String],
    ) -> Self {
        Self {
            scope: Scope::with_parameters(parameters),
            options,
            responses,
            target,
            step: 0,
            mode: if target == 0 { Mode::Collect } else { Mode::Replay },
            messages: Vec::new(),
            loose: Vec::new(),
            open: None,
            capture: None,
            in_step: false,
            overrides: BTreeMap::new(),
            binds_response: false,
            more_steps: false,
        }
    }

    fn walk_nodes(&mut self, nodes: &[Node]) -> CompileResult<Flow> {
        for node in nodes {
            if self.walk_node(node)? == Flow::Halt {
                return Ok(Flow::Halt);
            }
        }
        Ok(Flow::Continue)
    }

    fn walk_node(&mut self, node: &Node) -> CompileResult<Flow> {
        match self.render_node(node) {
            // A failure past the target step means that step would fail
            // later; it still counts as more work.
            Err(error) if self.mode == Mode::Probe => {
                trace!(error = %error, "probe stopped on error");
                self.more_steps = true;
                Ok(Flow::Halt)
            }
            other => other,
        }
    }

    fn render_node(&mut self, node: &Node) -> CompileResult<Flow> {
        match node {
            Node::Config(_) => Ok(Flow::Continue),
            Node::Text { value, .. } => Ok(self.emit_text(value)),
            Node::Fence(fence) => Ok(self.emit_text(&fence.raw())),
            Node::Expression { expression, .. } => {
                let value = evaluate(expression, &mut self.scope)?;
                if expression.is_side_effect() {
                    return Ok(Flow::Continue);
                }
                Ok(self.emit_text(&value.to_display_string()))
            }
            Node::If(block) => self.render_if(block),
            Node::Each(block) => self.render_each(block),
            Node::Element(element) => self.render_element(element),
        }
    }

    // ------------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------------

    fn render_if(&mut self, block: &IfBlock) -> CompileResult<Flow> {
        for branch in &block.branches {
            if evaluate(&branch.test, &mut self.scope)?.is_truthy() {
                return self.render_block(&branch.children, &[]);
            }
        }
        match &block.alternate {
            Some(alternate) => self.render_block(alternate, &[]),
            None => Ok(Flow::Continue),
        }
    }

    fn render_each(&mut self, block: &EachBlock) -> CompileResult<Flow> {
        let entries: Vec<(Value, Value)> = match evaluate(&block.iterable, &mut self.scope)? {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (item, Value::Number(i as f64)))
                .collect(),
            Value::Object(map) => map
                .into_iter()
                .map(|(key, value)| (value, Value::String(key)))
                .collect(),
            other => {
                return Err(EvalError::InvalidOperand {
                    operator: "each".to_string(),
                    reason: format!("{} is not iterable", describe(&other)),
                    span: block.iterable.span(),
                }
                .into())
            }
        };

        if entries.is_empty() {
            return match &block.alternate {
                Some(alternate) => self.render_block(alternate, &[]),
                None => Ok(Flow::Continue),
            };
        }

        for (item, index) in entries {
            let mut bindings = vec![(block.item.as_str(), item)];
            if let Some(name) = &block.index {
                bindings.push((name.as_str(), index));
            }
            if self.render_block(&block.body, &bindings)? == Flow::Halt {
                return Ok(Flow::Halt);
            }
        }
        Ok(Flow::Continue)
    }

    /// Render `nodes` in a fresh child scope holding `bindings`.
    fn render_block(&mut self, nodes: &[Node], bindings: &[(&str, Value)]) -> CompileResult<Flow> {
        let frame = self.scope.child();
        for (name, value) in bindings {
            self.scope.declare(*name, value.clone());
        }
        let flow = self.walk_nodes(nodes);
        self.scope.exit(frame);
        flow
    }

    // ------------------------------------------------------------------------
    // Elements
    // ------------------------------------------------------------------------

    fn render_element(&mut self, element: &Element) -> CompileResult<Flow> {
        if self.capture.is_some() {
            return Err(CompileError::structure(
                format!("<{}> is not allowed inside a text-only tag", element.name),
                element.span,
            ));
        }
        match element.name {
            TagName::System => self.render_message(element, Role::System),
            TagName::User => self.render_message(element, Role::User),
            TagName::Assistant => self.render_message(element, Role::Assistant),
            TagName::Message => {
                let role = self.required_attribute(element, "role")?;
                let role = role
                    .parse::<Role>()
                    .map_err(|reason| CompileError::structure(reason, element.span))?;
                self.render_message(element, role)
            }
            TagName::Tool => self.render_tool_result(element),
            TagName::Step => self.render_step_tag(element),
            TagName::ContentText | TagName::ContentImage | TagName::ContentFile => {
                self.render_content(element)
            }
            TagName::ToolCall => self.render_tool_call(element),
        }
    }

    fn render_message(&mut self, element: &Element, role: Role) -> CompileResult<Flow> {
        if self.open.is_some() {
            return Err(CompileError::structure(
                format!("<{}> cannot be nested inside another message", element.name),
                element.span,
            ));
        }
        if self.mode == Mode::Probe {
            self.more_steps = true;
            return Ok(Flow::Halt);
        }
        self.flush_loose();

        self.open = Some(OpenMessage {
            role,
            parts: Vec::new(),
        });
        let flow = self.walk_nodes(&element.children);
        let open = self.open.take();
        let flow = flow?;

        if let (Mode::Collect, Some(open)) = (self.mode, open) {
            self.messages
                .push(Message::new(open.role, trim_parts(open.parts)));
        }
        Ok(flow)
    }

    fn render_tool_result(&mut self, element: &Element) -> CompileResult<Flow> {
        if self.open.is_some() {
            return Err(CompileError::structure(
                "<tool> cannot be nested inside another message",
                element.span,
            ));
        }
        let id = self.required_attribute(element, "id")?;
        let name = self.optional_attribute(element, "name")?.unwrap_or_default();
        if self.mode == Mode::Probe {
            self.more_steps = true;
            return Ok(Flow::Halt);
        }
        self.flush_loose();

        let text = self.capture_text(&element.children)?;
        if self.mode == Mode::Collect {
            self.messages.push(Message::tool_result(ToolResult {
                id,
                name,
                result: serde_json::Value::String(text.trim().to_string()),
                is_error: false,
            }));
        }
        Ok(Flow::Continue)
    }

    fn render_content(&mut self, element: &Element) -> CompileResult<Flow> {
        let mime_type = self.optional_attribute(element, "mime")?;
        if self.mode == Mode::Probe {
            self.more_steps = true;
            return Ok(Flow::Halt);
        }
        let text = self.capture_text(&element.children)?;
        let part = match element.name {
            TagName::ContentImage => ContentPart::Image {
                image: text.trim().to_string(),
                mime_type,
            },
            TagName::ContentFile => ContentPart::File {
                file: text.trim().to_string(),
                mime_type: mime_type.ok_or_else(|| {
                    CompileError::structure("<content-file> needs a mime attribute", element.span)
                })?,
            },
            _ => ContentPart::text(text),
        };
        self.emit_part(part);
        Ok(Flow::Continue)
    }

    fn render_tool_call(&mut self, element: &Element) -> CompileResult<Flow> {
        match &self.open {
            Some(open) if open.role == Role::Assistant => {}
            _ => {
                return Err(CompileError::structure(
                    "<tool-call> is only allowed inside an assistant message",
                    element.span,
                ))
            }
        }
        let id = self.required_attribute(element, "id")?;
        let name = self.required_attribute(element, "name")?;
        let arguments = match element.attribute("arguments") {
            Some(attribute) => self.attribute_value(attribute)?.to_json(),
            None => serde_json::Value::Object(serde_json::Map::new()),
        };
        // Children are not part of a tool call, but their side effects still run.
        self.capture_text(&element.children)?;
        self.emit_part(ContentPart::ToolCall(ToolCall {
            id,
            name,
            arguments,
        }));
        Ok(Flow::Continue)
    }

    // ------------------------------------------------------------------------
    // Steps
    // ------------------------------------------------------------------------

    fn render_step_tag(&mut self, element: &Element) -> CompileResult<Flow> {
        if self.in_step {
            return Err(CompileError::structure("steps cannot be nested", element.span));
        }
        if self.open.is_some() {
            return Err(CompileError::structure(
                "<step> cannot appear inside a message",
                element.span,
            ));
        }

        let mut binding: Option<String> = None;
        let mut parse_json = false;
        let mut overrides = BTreeMap::new();
        for attribute in &element.attributes {
            match attribute.name.as_str() {
                "as" => binding = Some(self.attribute_value(attribute)?.to_js_string()),
                "json" => parse_json = self.attribute_value(attribute)?.is_truthy(),
                name => {
                    overrides.insert(name.to_string(), self.attribute_value(attribute)?.to_json());
                }
            }
        }

        if self.mode == Mode::Probe {
            self.more_steps = true;
            return Ok(Flow::Halt);
        }
        if self.mode == Mode::Collect {
            self.overrides = overrides;
            self.binds_response = binding.is_some();
        }

        self.in_step = true;
        let flow = self.walk_nodes(&element.children);
        self.in_step = false;
        if flow? == Flow::Halt {
            return Ok(Flow::Halt);
        }

        self.flush_loose();
        match self.mode {
            Mode::Replay => {
                if let Some(name) = binding {
                    self.bind_response(name, parse_json)?;
                }
                self.step += 1;
                if self.step == self.target {
                    self.mode = Mode::Collect;
                }
            }
            Mode::Collect => {
                self.step += 1;
                self.mode = Mode::Probe;
            }
            Mode::Probe => {}
        }
        trace!(step = self.step, mode = ?self.mode, "step boundary");
        Ok(Flow::Continue)
    }

    fn bind_response(&mut self, name: String, parse_json: bool) -> CompileResult<()> {
        let text = self.responses.get(self.step).cloned().unwrap_or_default();
        let value = if parse_json {
            let parsed: serde_json::Value = serde_json::from_str(text.trim()).map_err(|e| {
                CompileError::InvalidStepResponse {
                    name: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            Value::from(parsed)
        } else {
            Value::String(text)
        };
        self.scope.set(name, value);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------------

    fn emit_text(&mut self, text: &str) -> Flow {
        if let Some(buffer) = self.capture.as_mut() {
            buffer.push_str(text);
            return Flow::Continue;
        }
        match self.mode {
            Mode::Replay => Flow::Continue,
            Mode::Probe if text.trim().is_empty() => Flow::Continue,
            Mode::Probe => {
                self.more_steps = true;
                Flow::Halt
            }
            Mode::Collect => {
                let parts = match self.open.as_mut() {
                    Some(open) => &mut open.parts,
                    None => &mut self.loose,
                };
                match parts.last_mut() {
                    Some(ContentPart::Text { text: last }) => last.push_str(text),
                    _ => parts.push(ContentPart::text(text)),
                }
                Flow::Continue
            }
        }
    }

    fn emit_part(&mut self, part: ContentPart) {
        if self.mode != Mode::Collect {
            return;
        }
        match self.open.as_mut() {
            Some(open) => open.parts.push(part),
            None => self.loose.push(part),
        }
    }

    /// Render `nodes` to plain text. Tags are rejected while capturing.
    fn capture_text(&mut self, nodes: &[Node]) -> CompileResult<String> {
        let previous = self.capture.replace(String::new());
        let flow = self.walk_nodes(nodes);
        let text = std::mem::replace(&mut self.capture, previous).unwrap_or_default();
        flow?;
        Ok(text)
    }

    /// Turn pending loose content into a message with the default role.
    fn flush_loose(&mut self) {
        let parts = trim_parts(std::mem::take(&mut self.loose));
        if self.mode == Mode::Collect && !parts.is_empty() {
            self.messages
                .push(Message::new(self.options.default_role, parts));
        }
    }

    // ------------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------------

    fn attribute_value(&mut self, attribute: &Attribute) -> CompileResult<Value> {
        Ok(match &attribute.value {
            AttributeValue::Literal(text) => Value::string(text.as_str()),
            AttributeValue::Expression(expression) => evaluate(expression, &mut self.scope)?,
            AttributeValue::Flag => Value::Bool(true),
        })
    }

    fn optional_attribute(&mut self, element: &Element, name: &str) -> CompileResult<Option<String>> {
        match element.attribute(name) {
            Some(attribute) => {
                let value = self.attribute_value(attribute)?;
                Ok((!value.is_nullish()).then(|| value.to_js_string()))
            }
            None => Ok(None),
        }
    }

    fn required_attribute(&mut self, element: &Element, name: &str) -> CompileResult<String> {
        self.optional_attribute(element, name)?.ok_or_else(|| {
            CompileError::structure(
                format!("<{}> needs a {} attribute", element.name, name),
                attribute_span(element, name),
            )
        })
    }
}

fn attribute_span(element: &Element, name: &str) -> Span {
    element
        .attribute(name)
        .map(|attribute| attribute.span)
        .unwrap_or(element.span)
}

/// Trim text parts and drop the ones left empty.
fn trim_parts(parts: Vec<ContentPart>) -> Vec<ContentPart> {
    parts
        .into_iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| ContentPart::text(trimmed))
            }
            other => Some(other),
        })
        .collect()
}

/// `typeof`, but with `null` and arrays told apart.
fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Array(_) => "array",
        other => other.type_of(),
    }
}
