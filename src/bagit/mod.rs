pub use crate::bagit::bag::{
    create_bag, open_bag, validate_bag, Bag, BagItVersion, BagUpdater, FetchEntry,
};
pub use crate::bagit::consts::{
    BAGIT_DEFAULT_VERSION, LABEL_BAG_COUNT, LABEL_BAG_GROUP_IDENTIFIER, LABEL_BAG_SIZE,
    LABEL_BAGIT_PROFILE_IDENTIFIER, LABEL_CONTACT_EMAIL, LABEL_CONTACT_NAME, LABEL_CONTACT_PHONE,
    LABEL_EXTERNAL_DESCRIPTION, LABEL_EXTERNAL_IDENTIFIER, LABEL_INTERNAL_SENDER_DESCRIPTION,
    LABEL_INTERNAL_SENDER_IDENTIFIER, LABEL_ORGANIZATION_ADDRESS, LABEL_SOURCE_ORGANIZATION,
};
pub use crate::bagit::digest::{DigestAlgorithm, HexDigest};
pub use crate::bagit::error::*;
pub use crate::bagit::manifest::ManifestEntry;
pub use crate::bagit::tag::{Tag, TagCodec, TagList};
pub use crate::bagit::validate::{
    validate_bag_with_options, IssueLevel, ValidateOptions, ValidationIssue, ValidationResult,
    ValidationVerdict,
};

mod bag;
mod consts;
mod digest;
mod encoding;
mod error;
mod io;
mod manifest;
mod path_policy;
mod tag;
mod validate;
