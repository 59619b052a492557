//! Deployment descriptor checks
//!
//! Every check runs and every violation is collected, so a single pass
//! reports everything wrong with a template.

use regex::Regex;
use serde_yaml::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

use super::descriptor::{intrinsic, QueueSpec, TemplateDescriptor};
use super::render::unresolved_placeholders;

pub const CONTINUE_URL_VARIABLE: &str = "SQS_CONTINUE_URL";
pub const REPLAY_URL_VARIABLE: &str = "SQS_REPLAY_URL";

pub const CONTINUING_MAX_RECEIVE_COUNT: u64 = 1;
pub const REPLAY_MAX_RECEIVE_COUNT: u64 = 3;
pub const TRIGGER_BATCH_SIZE: u64 = 1;

/// Function properties SAM cannot fill in for a `provided` runtime package
pub const REQUIRED_FUNCTION_PROPERTIES: [&str; 3] = ["Runtime", "Handler", "MemorySize"];

/// Fields the application repository needs to publish the application
pub const REQUIRED_METADATA: [&str; 9] = [
    "Name",
    "Description",
    "Author",
    "Labels",
    "SemanticVersion",
    "LicenseUrl",
    "ReadmeUrl",
    "HomePageUrl",
    "SourceCodeUrl",
];

pub const PSEUDO_PARAMETERS: [&str; 8] = [
    "AWS::AccountId",
    "AWS::NotificationARNs",
    "AWS::NoValue",
    "AWS::Partition",
    "AWS::Region",
    "AWS::StackId",
    "AWS::StackName",
    "AWS::URLSuffix",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("{0}")]
    Malformed(String),

    #[error("resource {0} has no Type")]
    MissingType(String),

    #[error("{location}: {intrinsic} references undefined {target}")]
    UnresolvedReference {
        location: String,
        intrinsic: String,
        target: String,
    },

    #[error("function {function} declares no SQS trigger")]
    MissingTrigger { function: String },

    #[error("function {function}: SQS trigger {event} has batch size {actual:?}, expected 1")]
    BatchSize {
        function: String,
        event: String,
        actual: Option<u64>,
    },

    #[error("function {function} does not set {property}")]
    MissingProperty {
        function: String,
        property: &'static str,
    },

    #[error("function {function} does not receive {variable} from a declared queue")]
    MissingEnvironment { function: String, variable: String },

    #[error("queue {queue}: visibility timeout {visibility_timeout}s must exceed function {function} timeout {timeout}s")]
    VisibilityTimeout {
        queue: String,
        visibility_timeout: u64,
        function: String,
        timeout: u64,
    },

    #[error("queue {queue}: messages are delayed by {actual}s, expected no delay")]
    DelaySeconds { queue: String, actual: u64 },

    #[error("queue {queue}: maxReceiveCount is {actual:?}, expected {expected}")]
    MaxReceiveCount {
        queue: String,
        expected: u64,
        actual: Option<u64>,
    },

    #[error("queue {queue}: redrive target {target:?} is not a declared queue")]
    RedriveTarget {
        queue: String,
        target: Option<String>,
    },

    #[error("packaging metadata is missing {0}")]
    Metadata(&'static str),

    #[error("unresolved placeholder {0}")]
    Placeholder(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.violations.is_empty() {
            return write!(f, "template is valid");
        }
        writeln!(f, "{} violation(s):", self.violations.len())?;
        for violation in &self.violations {
            writeln!(f, "  - {violation}")?;
        }
        Ok(())
    }
}

/// Validate a template as it sits in the repository, placeholders allowed
pub fn validate(text: &str) -> ValidationReport {
    let mut report = ValidationReport::default();
    match TemplateDescriptor::parse(text) {
        Ok(descriptor) => check_descriptor(&descriptor, &mut report),
        Err(err) => report.push(Violation::Malformed(format!("{err:#}"))),
    }
    report
}

/// Validate a template about to be deployed: no placeholder may remain
pub fn check_rendered(text: &str) -> ValidationReport {
    let mut report = validate(text);
    for token in unresolved_placeholders(text) {
        report.push(Violation::Placeholder(token));
    }
    report
}

fn check_descriptor(descriptor: &TemplateDescriptor, report: &mut ValidationReport) {
    for (name, resource_type) in &descriptor.resources {
        if resource_type.is_none() {
            report.push(Violation::MissingType(name.clone()));
        }
    }

    if let Some(metadata) = &descriptor.metadata {
        for field in REQUIRED_METADATA {
            if !metadata.has(field) {
                report.push(Violation::Metadata(field));
            }
        }
    }

    check_references(descriptor, report);
    check_queues(descriptor, report);
    check_functions(descriptor, report);
}

fn check_queues(descriptor: &TemplateDescriptor, report: &mut ValidationReport) {
    for (name, queue) in &descriptor.queues {
        match queue.delay_seconds {
            Some(0) => {}
            Some(actual) => report.push(Violation::DelaySeconds {
                queue: name.clone(),
                actual,
            }),
            None => tracing::warn!(queue = %name, "DelaySeconds is not a literal, not checked"),
        }
    }
}

fn check_references(descriptor: &TemplateDescriptor, report: &mut ValidationReport) {
    let Value::Mapping(sections) = &descriptor.document else {
        return;
    };
    for (section, value) in sections {
        let Some(section) = section.as_str() else {
            continue;
        };
        // Metadata carries free text, not intrinsics
        if section == "Metadata" {
            continue;
        }
        walk(value, section, &BTreeSet::new(), descriptor, report);
    }
}

fn walk(
    value: &Value,
    location: &str,
    locals: &BTreeSet<String>,
    descriptor: &TemplateDescriptor,
    report: &mut ValidationReport,
) {
    if let Some((name, argument)) = intrinsic(value) {
        match name.as_str() {
            "Ref" => {
                if let Some(target) = argument.as_str() {
                    check_reference(location, "Ref", target, locals, descriptor, report);
                }
                return;
            }
            "GetAtt" => {
                let target = match argument {
                    Value::String(target) => target.split_once('.').map(|(id, _)| id),
                    Value::Sequence(parts) => parts.first().and_then(Value::as_str),
                    _ => None,
                };
                match target {
                    Some(target) if descriptor.resources.contains_key(target) => {}
                    Some(target) => report.push(unresolved(location, "GetAtt", target)),
                    None => report.push(Violation::Malformed(format!(
                        "{location}: GetAtt expects Resource.Attribute"
                    ))),
                }
                return;
            }
            "Sub" => {
                walk_sub(argument, location, locals, descriptor, report);
                return;
            }
            _ => {}
        }
    }

    match value {
        Value::Tagged(tagged) => walk(&tagged.value, location, locals, descriptor, report),
        Value::Sequence(items) => {
            for item in items {
                walk(item, location, locals, descriptor, report);
            }
        }
        Value::Mapping(mapping) => {
            for (key, item) in mapping {
                let child = match key.as_str() {
                    Some(key) => format!("{location}.{key}"),
                    None => location.to_string(),
                };
                walk(item, &child, locals, descriptor, report);
            }
        }
        _ => {}
    }
}

fn walk_sub(
    argument: &Value,
    location: &str,
    locals: &BTreeSet<String>,
    descriptor: &TemplateDescriptor,
    report: &mut ValidationReport,
) {
    let (text, variables) = match argument {
        Value::String(text) => (Some(text.as_str()), None),
        Value::Sequence(parts) => (parts.first().and_then(Value::as_str), parts.get(1)),
        _ => (None, None),
    };

    let mut scope = locals.clone();
    if let Some(variables) = variables {
        if let Some(mapping) = variables.as_mapping() {
            scope.extend(mapping.keys().filter_map(Value::as_str).map(str::to_string));
        }
        walk(variables, location, locals, descriptor, report);
    }

    let Some(text) = text else {
        report.push(Violation::Malformed(format!(
            "{location}: Sub expects a string"
        )));
        return;
    };
    for variable in sub_variables(text) {
        let target = variable.split_once('.').map_or(variable, |(id, _)| id);
        if variable.contains('.') && !variable.starts_with("AWS::") {
            if !descriptor.resources.contains_key(target) && !scope.contains(target) {
                report.push(unresolved(location, "Sub", target));
            }
        } else {
            check_reference(location, "Sub", variable, &scope, descriptor, report);
        }
    }
}

/// Variables named by `${...}` in a Sub string; `${!Literal}` is an escape
fn sub_variables(text: &str) -> Vec<&str> {
    static VARIABLE: OnceLock<Regex> = OnceLock::new();
    let pattern = VARIABLE.get_or_init(|| Regex::new(r"\$\{([^}]*)\}").expect("static regex"));
    pattern
        .captures_iter(text)
        .filter_map(|captures| captures.get(1))
        .map(|variable| variable.as_str().trim())
        .filter(|variable| !variable.starts_with('!'))
        .collect()
}

fn check_reference(
    location: &str,
    intrinsic: &str,
    target: &str,
    locals: &BTreeSet<String>,
    descriptor: &TemplateDescriptor,
    report: &mut ValidationReport,
) {
    let defined = descriptor.resources.contains_key(target)
        || descriptor.parameters.contains(target)
        || locals.contains(target)
        || PSEUDO_PARAMETERS.contains(&target);
    if !defined {
        report.push(unresolved(location, intrinsic, target));
    }
}

fn unresolved(location: &str, intrinsic: &str, target: &str) -> Violation {
    Violation::UnresolvedReference {
        location: location.to_string(),
        intrinsic: intrinsic.to_string(),
        target: target.to_string(),
    }
}

fn check_functions(descriptor: &TemplateDescriptor, report: &mut ValidationReport) {
    for (name, function) in &descriptor.functions {
        if function.sqs_triggers.is_empty() {
            report.push(Violation::MissingTrigger {
                function: name.clone(),
            });
        }
        for property in REQUIRED_FUNCTION_PROPERTIES {
            if !function.declared.contains(property) {
                report.push(Violation::MissingProperty {
                    function: name.clone(),
                    property,
                });
            }
        }
        for trigger in &function.sqs_triggers {
            if trigger.batch_size != Some(TRIGGER_BATCH_SIZE) {
                report.push(Violation::BatchSize {
                    function: name.clone(),
                    event: trigger.event.clone(),
                    actual: trigger.batch_size,
                });
            }
        }

        for queue_name in function.referenced_queues(&descriptor.queues) {
            let queue = &descriptor.queues[queue_name];
            match (queue.visibility_timeout, function.timeout) {
                (Some(visibility_timeout), Some(timeout)) if visibility_timeout <= timeout => {
                    report.push(Violation::VisibilityTimeout {
                        queue: queue_name.to_string(),
                        visibility_timeout,
                        function: name.clone(),
                        timeout,
                    });
                }
                (Some(_), Some(_)) => {}
                _ => tracing::warn!(
                    queue = %queue_name,
                    function = %name,
                    "timeouts are resolved at deploy time, visibility timeout not checked"
                ),
            }
        }

        let wiring = [
            (CONTINUE_URL_VARIABLE, CONTINUING_MAX_RECEIVE_COUNT),
            (REPLAY_URL_VARIABLE, REPLAY_MAX_RECEIVE_COUNT),
        ];
        for (variable, expected) in wiring {
            let queue = function
                .environment_ref(variable)
                .and_then(|queue| Some((queue, descriptor.queues.get(queue)?)));
            match queue {
                Some((queue_name, queue)) => {
                    check_redrive(queue_name, queue, expected, descriptor, report)
                }
                None => report.push(Violation::MissingEnvironment {
                    function: name.clone(),
                    variable: variable.to_string(),
                }),
            }
        }
    }
}

fn check_redrive(
    queue_name: &str,
    queue: &QueueSpec,
    expected: u64,
    descriptor: &TemplateDescriptor,
    report: &mut ValidationReport,
) {
    let redrive = queue.redrive.as_ref();
    let actual = redrive.and_then(|redrive| redrive.max_receive_count);
    if actual != Some(expected) {
        report.push(Violation::MaxReceiveCount {
            queue: queue_name.to_string(),
            expected,
            actual,
        });
    }

    let target = redrive.and_then(|redrive| redrive.target.clone());
    let declared = target
        .as_deref()
        .is_some_and(|target| descriptor.queues.contains_key(target));
    if !declared {
        report.push(Violation::RedriveTarget {
            queue: queue_name.to_string(),
            target,
        });
    }
}
