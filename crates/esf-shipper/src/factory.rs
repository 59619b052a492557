//! Building shippers from configured outputs and replayed messages.

use esf_config::{ElasticsearchArgs, Output, OutputType};
use serde_json::Value;

use crate::elasticsearch::ElasticsearchShipper;
use crate::error::{Result, ShipperError};

pub struct ShipperFactory;

impl ShipperFactory {
    pub fn create_from_output(output: &Output, tags: &[String]) -> Result<ElasticsearchShipper> {
        match output {
            Output::Elasticsearch(args) => {
                ElasticsearchShipper::from_args(args.clone(), tags.to_vec())
            }
        }
    }

    /// Shipper for the output named in a replay message
    pub fn create_from_replay(
        output_type: &str,
        output_args: &Value,
        tags: &[String],
    ) -> Result<ElasticsearchShipper> {
        let output_type: OutputType = output_type
            .parse()
            .map_err(|e| ShipperError::InvalidOutput(format!("{e}")))?;

        match output_type {
            OutputType::Elasticsearch => {
                let args: ElasticsearchArgs = serde_json::from_value(output_args.clone())
                    .map_err(|e| ShipperError::InvalidOutput(e.to_string()))?;
                args.validate()
                    .map_err(|e| ShipperError::InvalidOutput(format!("{e:#}")))?;
                ElasticsearchShipper::from_args(args, tags.to_vec())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_from_replay_args() {
        let args = json!({
            "elasticsearch_url": "http://es:9200",
            "api_key": "key",
            "es_index_or_datastream_name": "logs-generic-default",
            "batch_max_actions": 500,
            "batch_max_bytes": 10485760,
        });
        let shipper = ShipperFactory::create_from_replay("elasticsearch", &args, &[]).unwrap();
        assert_eq!(shipper.index(), "logs-generic-default");
    }

    #[test]
    fn rejects_unknown_output_type() {
        let err = ShipperFactory::create_from_replay("logstash", &json!({}), &[])
            .err()
            .unwrap();
        assert!(matches!(err, ShipperError::InvalidOutput(_)));
    }

    #[test]
    fn rejects_invalid_args() {
        let err = ShipperFactory::create_from_replay(
            "elasticsearch",
            &json!({"elasticsearch_url": "http://es:9200"}),
            &[],
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("api_key or username and password"));
    }
}
