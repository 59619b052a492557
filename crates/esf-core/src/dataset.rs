//! Dataset discovery from S3 object keys
//!
//! AWS services write their logs under well known key layouts. The first
//! matching rule wins; anything unrecognised is `generic`.

use serde_json::Value;

pub const GENERIC_DATASET: &str = "generic";

const DATASET_RULES: &[(&[&str], &str)] = &[
    (
        &["/CloudTrail/", "/CloudTrail-Digest/", "/CloudTrail-Insight/"],
        "aws.cloudtrail",
    ),
    (&["exportedlogs", "awslogs"], "aws.cloudwatch_logs"),
    (&["/elasticloadbalancing/"], "aws.elb_logs"),
    (&["/network-firewall/"], "aws.firewall_logs"),
    (&["lambda"], "aws.lambda"),
    (&["/SMSUsageReports/"], "aws.sns"),
    (&["/StorageLens/"], "aws.s3_storage_lens"),
    (&["/WAFLogs/"], "aws.waf"),
    (&["/vpcflowlogs/"], "aws.vpcflow"),
];

pub fn dataset_from_s3_key(object_key: &str) -> &'static str {
    DATASET_RULES
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| object_key.contains(needle)))
        .map(|(_, dataset)| *dataset)
        .unwrap_or(GENERIC_DATASET)
}

/// Object key of the first S3 notification carried by the first SQS record
/// of a Lambda payload.
pub fn s3_key_from_lambda_event(lambda_event: &Value) -> Option<String> {
    let body = lambda_event.pointer("/Records/0/body")?.as_str()?;
    let notification: Value = serde_json::from_str(body).ok()?;
    notification
        .pointer("/Records/0/s3/object/key")
        .and_then(Value::as_str)
        .map(str::to_string)
}
