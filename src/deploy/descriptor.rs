//! Typed view of the deployment descriptor
//!
//! The template is kept as a `serde_yaml::Value` so intrinsic tags (`!Ref`,
//! `!GetAtt`, ...) survive parsing; this module pulls out the parts the
//! validator reasons about.

use anyhow::{Context, Result};
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet};

pub const QUEUE_TYPE: &str = "AWS::SQS::Queue";
pub const FUNCTION_TYPE: &str = "AWS::Serverless::Function";
pub const SAR_METADATA_KEY: &str = "AWS::ServerlessRepo::Application";

/// Defaults applied by SQS and SAM when the property is omitted
pub const DEFAULT_VISIBILITY_TIMEOUT: u64 = 30;
pub const DEFAULT_FUNCTION_TIMEOUT: u64 = 3;
pub const DEFAULT_DELAY_SECONDS: u64 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedrivePolicy {
    /// Logical id named by `deadLetterTargetArn`, when it is an intrinsic
    pub target: Option<String>,
    pub max_receive_count: Option<u64>,
}

/// Numeric properties are `None` when not written as a literal number,
/// e.g. a `!Ref` to a parameter resolved at deploy time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub visibility_timeout: Option<u64>,
    pub delay_seconds: Option<u64>,
    pub redrive: Option<RedrivePolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqsTrigger {
    pub event: String,
    /// Logical id of the queue the trigger is bound to
    pub queue: Option<String>,
    pub batch_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSpec {
    /// Property names set on the function or in `Globals.Function`
    pub declared: BTreeSet<String>,
    /// `None` when written as an intrinsic
    pub timeout: Option<u64>,
    pub environment: BTreeMap<String, Value>,
    pub sqs_triggers: Vec<SqsTrigger>,
}

impl FunctionSpec {
    /// Logical id an environment variable points at through `Ref`
    pub fn environment_ref(&self, variable: &str) -> Option<&str> {
        self.environment.get(variable).and_then(intrinsic_target)
    }

    /// Queues the function consumes from or is handed the URL of
    pub fn referenced_queues<'a>(
        &'a self,
        queues: &'a BTreeMap<String, QueueSpec>,
    ) -> BTreeSet<&'a str> {
        let triggers = self
            .sqs_triggers
            .iter()
            .filter_map(|trigger| trigger.queue.as_deref());
        let environment = self.environment.values().filter_map(intrinsic_target);

        triggers
            .chain(environment)
            .filter(|name| queues.contains_key(*name))
            .collect()
    }
}

/// Serverless Application Repository fields, by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackagingMetadata {
    pub fields: BTreeMap<String, Value>,
}

impl PackagingMetadata {
    /// Whether `field` holds a value: a non-empty string or a non-empty list
    pub fn has(&self, field: &str) -> bool {
        match self.fields.get(field) {
            Some(Value::String(text)) => !text.trim().is_empty(),
            Some(Value::Sequence(items)) => !items.is_empty(),
            Some(Value::Null) | None => false,
            Some(_) => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TemplateDescriptor {
    /// Logical id to resource type, for every declared resource
    pub resources: BTreeMap<String, Option<String>>,
    pub parameters: BTreeSet<String>,
    pub queues: BTreeMap<String, QueueSpec>,
    pub functions: BTreeMap<String, FunctionSpec>,
    pub metadata: Option<PackagingMetadata>,
    pub document: Value,
}

impl TemplateDescriptor {
    pub fn parse(text: &str) -> Result<Self> {
        let document: Value =
            serde_yaml::from_str(text).context("Template is not valid YAML")?;
        Self::from_value(document)
    }

    pub fn from_value(document: Value) -> Result<Self> {
        let resources = document
            .get("Resources")
            .and_then(Value::as_mapping)
            .context("Template has no Resources mapping")?;

        let globals = document
            .get("Globals")
            .and_then(|globals| globals.get("Function"));

        let mut descriptor = TemplateDescriptor {
            resources: BTreeMap::new(),
            parameters: mapping_keys(document.get("Parameters")),
            queues: BTreeMap::new(),
            functions: BTreeMap::new(),
            metadata: document
                .get("Metadata")
                .and_then(|metadata| metadata.get(SAR_METADATA_KEY))
                .map(packaging_metadata),
            document: Value::Null,
        };

        for (name, resource) in resources {
            let Some(name) = name.as_str() else { continue };
            let resource_type = resource.get("Type").and_then(Value::as_str);
            descriptor
                .resources
                .insert(name.to_string(), resource_type.map(str::to_string));

            let properties = resource.get("Properties");
            match resource_type {
                Some(QUEUE_TYPE) => {
                    descriptor
                        .queues
                        .insert(name.to_string(), queue_spec(properties));
                }
                Some(FUNCTION_TYPE) => {
                    let function = function_spec(properties, globals);
                    descriptor.functions.insert(name.to_string(), function);
                }
                _ => {}
            }
        }

        descriptor.document = document;
        Ok(descriptor)
    }
}

fn property<'a>(properties: Option<&'a Value>, key: &str) -> Option<&'a Value> {
    properties.and_then(|properties| properties.get(key))
}

fn queue_spec(properties: Option<&Value>) -> QueueSpec {
    let redrive = property(properties, "RedrivePolicy").map(|policy| RedrivePolicy {
        target: policy.get("deadLetterTargetArn").and_then(intrinsic_target).map(str::to_string),
        max_receive_count: policy.get("maxReceiveCount").and_then(as_u64),
    });

    QueueSpec {
        visibility_timeout: literal_or_default(
            property(properties, "VisibilityTimeout"),
            DEFAULT_VISIBILITY_TIMEOUT,
        ),
        delay_seconds: literal_or_default(
            property(properties, "DelaySeconds"),
            DEFAULT_DELAY_SECONDS,
        ),
        redrive,
    }
}

fn function_spec(properties: Option<&Value>, globals: Option<&Value>) -> FunctionSpec {
    let environment = property(properties, "Environment")
        .and_then(|environment| environment.get("Variables"))
        .and_then(Value::as_mapping)
        .map(|variables| {
            variables
                .iter()
                .filter_map(|(key, value)| Some((key.as_str()?.to_string(), value.clone())))
                .collect()
        })
        .unwrap_or_default();

    let sqs_triggers = property(properties, "Events")
        .and_then(Value::as_mapping)
        .map(|events| {
            events
                .iter()
                .filter(|(_, event)| event.get("Type").and_then(Value::as_str) == Some("SQS"))
                .filter_map(|(name, event)| {
                    let event_properties = event.get("Properties");
                    Some(SqsTrigger {
                        event: name.as_str()?.to_string(),
                        queue: property(event_properties, "Queue").and_then(intrinsic_target).map(str::to_string),
                        batch_size: property(event_properties, "BatchSize").and_then(as_u64),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let mut declared = mapping_keys(globals);
    declared.extend(mapping_keys(properties));

    let timeout = property(properties, "Timeout").or_else(|| property(globals, "Timeout"));

    FunctionSpec {
        declared,
        timeout: literal_or_default(timeout, DEFAULT_FUNCTION_TIMEOUT),
        environment,
        sqs_triggers,
    }
}

fn packaging_metadata(application: &Value) -> PackagingMetadata {
    let fields = application
        .as_mapping()
        .map(|mapping| {
            mapping
                .iter()
                .filter_map(|(key, value)| Some((key.as_str()?.to_string(), value.clone())))
                .collect()
        })
        .unwrap_or_default();
    PackagingMetadata { fields }
}

/// Literal value of a numeric property, `default` when it is omitted and
/// `None` when it is only known at deploy time
fn literal_or_default(value: Option<&Value>, default: u64) -> Option<u64> {
    match value {
        None | Some(Value::Null) => Some(default),
        Some(value) => as_u64(value),
    }
}

fn mapping_keys(value: Option<&Value>) -> BTreeSet<String> {
    value
        .and_then(Value::as_mapping)
        .map(|mapping| {
            mapping
                .keys()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Numbers may be written as integers or as numeric strings
pub fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Intrinsic function name without its `!` or `Fn::` prefix, with its argument
pub fn intrinsic(value: &Value) -> Option<(String, &Value)> {
    match value {
        Value::Tagged(tagged) => {
            let tag = tagged.tag.to_string();
            Some((tag.trim_start_matches('!').to_string(), &tagged.value))
        }
        Value::Mapping(mapping) if mapping.len() == 1 => {
            let (key, argument) = mapping.iter().next()?;
            let key = key.as_str()?;
            if key == "Ref" {
                Some(("Ref".to_string(), argument))
            } else {
                key.strip_prefix("Fn::")
                    .map(|name| (name.to_string(), argument))
            }
        }
        _ => None,
    }
}

/// Logical id named by a `Ref` or `GetAtt`
pub fn intrinsic_target(value: &Value) -> Option<&str> {
    let (name, argument) = intrinsic(value)?;
    match name.as_str() {
        "Ref" => argument.as_str(),
        "GetAtt" => match argument {
            Value::String(target) => {
                Some(target.split_once('.').map_or(target.as_str(), |(id, _)| id))
            }
            Value::Sequence(parts) => parts.first().and_then(Value::as_str),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = r#"
Parameters:
  ConfigFile:
    Type: String
Globals:
  Function:
    Timeout: 60
    MemorySize: 256
Resources:
  DLQ:
    Type: AWS::SQS::Queue
  Queue:
    Type: AWS::SQS::Queue
    Properties:
      VisibilityTimeout: "120"
      RedrivePolicy:
        deadLetterTargetArn:
          Fn::GetAtt: [DLQ, Arn]
        maxReceiveCount: 2
  Function:
    Type: AWS::Serverless::Function
    Properties:
      Environment:
        Variables:
          QUEUE_URL: !Ref Queue
          STATIC: value
      Events:
        FromQueue:
          Type: SQS
          Properties:
            Queue: !GetAtt Queue.Arn
        Schedule:
          Type: Schedule
"#;

    #[test]
    fn extracts_queues_and_functions() {
        let descriptor = TemplateDescriptor::parse(TEMPLATE).unwrap();

        assert_eq!(descriptor.parameters, BTreeSet::from(["ConfigFile".to_string()]));
        assert_eq!(descriptor.resources.len(), 3);

        let dlq = &descriptor.queues["DLQ"];
        assert_eq!(dlq.visibility_timeout, Some(DEFAULT_VISIBILITY_TIMEOUT));
        assert_eq!(dlq.delay_seconds, Some(0));
        assert!(dlq.redrive.is_none());

        let queue = &descriptor.queues["Queue"];
        assert_eq!(queue.visibility_timeout, Some(120));
        assert_eq!(
            queue.redrive,
            Some(RedrivePolicy {
                target: Some("DLQ".to_string()),
                max_receive_count: Some(2),
            })
        );

        let function = &descriptor.functions["Function"];
        assert_eq!(function.timeout, Some(60));
        assert_eq!(
            function.declared,
            BTreeSet::from([
                "Environment".to_string(),
                "Events".to_string(),
                "MemorySize".to_string(),
                "Timeout".to_string(),
            ])
        );
        assert_eq!(function.environment_ref("QUEUE_URL"), Some("Queue"));
        assert_eq!(function.environment_ref("STATIC"), None);
        assert_eq!(
            function.sqs_triggers,
            vec![SqsTrigger {
                event: "FromQueue".to_string(),
                queue: Some("Queue".to_string()),
                batch_size: None,
            }]
        );
        assert_eq!(
            function.referenced_queues(&descriptor.queues),
            BTreeSet::from(["Queue"])
        );
    }

    #[test]
    fn intrinsic_numbers_are_unknown() {
        let descriptor = TemplateDescriptor::parse(
            r#"
Parameters:
  Visibility:
    Type: Number
Resources:
  Queue:
    Type: AWS::SQS::Queue
    Properties:
      VisibilityTimeout: !Ref Visibility
      DelaySeconds: 5
  Function:
    Type: AWS::Serverless::Function
    Properties:
      Timeout: { Ref: Visibility }
"#,
        )
        .unwrap();

        let queue = &descriptor.queues["Queue"];
        assert_eq!(queue.visibility_timeout, None);
        assert_eq!(queue.delay_seconds, Some(5));
        assert_eq!(descriptor.functions["Function"].timeout, None);
    }

    #[test]
    fn metadata_fields_need_a_value() {
        let descriptor = TemplateDescriptor::parse(
            r#"
Resources: {}
Metadata:
  AWS::ServerlessRepo::Application:
    Name: app
    Description: "  "
    Labels: []
    SemanticVersion: 1.0.0
"#,
        )
        .unwrap();

        let metadata = descriptor.metadata.unwrap();
        assert!(metadata.has("Name"));
        assert!(metadata.has("SemanticVersion"));
        assert!(!metadata.has("Description"));
        assert!(!metadata.has("Labels"));
        assert!(!metadata.has("Author"));
    }

    #[test]
    fn rejects_documents_without_resources() {
        let err = TemplateDescriptor::parse("Parameters: {}").unwrap_err();
        assert!(err.to_string().contains("Resources"));
    }

    #[test]
    fn long_and_short_intrinsic_forms() {
        let short: Value = serde_yaml::from_str("!GetAtt Queue.Arn").unwrap();
        let long: Value = serde_yaml::from_str("{ 'Fn::GetAtt': [Queue, Arn] }").unwrap();
        let reference: Value = serde_yaml::from_str("{ Ref: Queue }").unwrap();
        let plain: Value = serde_yaml::from_str("{ Other: Queue }").unwrap();

        assert_eq!(intrinsic_target(&short), Some("Queue"));
        assert_eq!(intrinsic_target(&long), Some("Queue"));
        assert_eq!(intrinsic_target(&reference), Some("Queue"));
        assert_eq!(intrinsic_target(&plain), None);
    }
}
