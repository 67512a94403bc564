//! Group name rules
//!
//! Groups are free-form UTF-8 names. Storage backends build ordered keys by
//! joining the group name and the record id with a NUL separator, so a NUL
//! inside a name would let one group's key range bleed into another's.

use crate::error::GroupNameError;

/// Check that `group` can be used as a partition key
pub fn validate_group(group: &str) -> Result<(), GroupNameError> {
    if group.is_empty() {
        return Err(GroupNameError::Empty);
    }
    if group.as_bytes().contains(&0) {
        return Err(GroupNameError::ContainsNul);
    }
    Ok(())
}
