//! Tenant-qualified stream ARNs.
//!
//! A described virtual table with streams enabled reports a composite ARN of
//! the form `<physical-arn>::<tenant>::<virtual-table>`, so that stream
//! consumers can demultiplex shared-stream records by tenant and virtual
//! table name.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

const SEPARATOR: &str = "::";

/// A composite stream ARN scoping a physical stream to one virtual table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamArn {
    pub physical_arn: String,
    pub tenant: String,
    pub virtual_table: String,
}

impl StreamArn {
    pub fn new(
        physical_arn: impl Into<String>,
        tenant: impl Into<String>,
        virtual_table: impl Into<String>,
    ) -> Self {
        Self {
            physical_arn: physical_arn.into(),
            tenant: tenant.into(),
            virtual_table: virtual_table.into(),
        }
    }
}

impl fmt::Display for StreamArn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.physical_arn, self.tenant, self.virtual_table
        )
    }
}

impl FromStr for StreamArn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Physical ARNs use single colons, so the last two "::" separators
        // always delimit the tenant and virtual table components.
        let (rest, virtual_table) = s
            .rsplit_once(SEPARATOR)
            .ok_or_else(|| Error::InvalidArgument(format!("malformed stream arn: {s}")))?;
        let (physical_arn, tenant) = rest
            .rsplit_once(SEPARATOR)
            .ok_or_else(|| Error::InvalidArgument(format!("malformed stream arn: {s}")))?;
        if physical_arn.is_empty() || tenant.is_empty() || virtual_table.is_empty() {
            return Err(Error::InvalidArgument(format!("malformed stream arn: {s}")));
        }
        Ok(StreamArn {
            physical_arn: physical_arn.to_string(),
            tenant: tenant.to_string(),
            virtual_table: virtual_table.to_string(),
        })
    }
}
