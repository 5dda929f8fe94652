//! Request bodies sent to the OCI compute API

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Where the boot disk of a new instance comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Fresh boot volume from a platform or custom image
    Image {
        /// Image OCID
        image_id: String,
        /// Optional boot volume size override
        boot_volume_size_gbs: Option<u32>,
    },
    /// Reuse an existing boot volume
    BootVolume {
        /// Boot volume OCID
        boot_volume_id: String,
    },
}

/// Everything needed to launch an instance except the target domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchTemplate {
    /// Compartment the instance is created in (the tenancy root)
    pub compartment_id: String,
    /// Shape name
    pub shape: String,
    /// OCPUs for flexible shapes
    pub ocpus: u32,
    /// Memory for flexible shapes
    pub memory_in_gbs: u32,
    /// Subnet for the primary VNIC
    pub subnet_id: String,
    /// Public key placed in `ssh_authorized_keys`
    pub ssh_public_key: String,
    /// Boot disk source
    pub source: ImageSource,
}

impl LaunchTemplate {
    /// Render the launch request for one availability domain
    pub fn details(&self, availability_domain: &str, now: DateTime<Utc>) -> CreateInstanceDetails {
        let source_details = match &self.source {
            ImageSource::Image {
                image_id,
                boot_volume_size_gbs,
            } => SourceDetails::Image {
                image_id: image_id.clone(),
                boot_volume_size_in_gbs: *boot_volume_size_gbs,
            },
            ImageSource::BootVolume { boot_volume_id } => SourceDetails::BootVolume {
                boot_volume_id: boot_volume_id.clone(),
            },
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("ssh_authorized_keys".to_string(), self.ssh_public_key.clone());

        CreateInstanceDetails {
            availability_domain: availability_domain.to_string(),
            compartment_id: self.compartment_id.clone(),
            shape: self.shape.clone(),
            display_name: format!("instance-{}", now.format("%Y%m%d-%H%M")),
            metadata,
            source_details,
            create_vnic_details: VnicDetails {
                subnet_id: self.subnet_id.clone(),
                assign_public_ip: false,
                assign_private_dns_record: true,
            },
            shape_config: ShapeConfig {
                ocpus: self.ocpus,
                memory_in_gbs: self.memory_in_gbs,
            },
        }
    }
}

/// `LaunchInstanceDetails` request body
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceDetails {
    /// Target availability domain
    pub availability_domain: String,
    /// Compartment OCID
    pub compartment_id: String,
    /// Shape name
    pub shape: String,
    /// Display name
    pub display_name: String,
    /// Instance metadata (SSH keys)
    pub metadata: BTreeMap<String, String>,
    /// Boot disk source
    pub source_details: SourceDetails,
    /// Primary VNIC
    pub create_vnic_details: VnicDetails,
    /// Flexible shape sizing
    pub shape_config: ShapeConfig,
}

/// Boot source, tagged by `sourceType`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "sourceType")]
pub enum SourceDetails {
    /// Boot from an image
    #[serde(rename = "image")]
    Image {
        /// Image OCID
        #[serde(rename = "imageId")]
        image_id: String,
        /// Boot volume size override
        #[serde(rename = "bootVolumeSizeInGBs", skip_serializing_if = "Option::is_none")]
        boot_volume_size_in_gbs: Option<u32>,
    },
    /// Boot from an existing volume
    #[serde(rename = "bootVolume")]
    BootVolume {
        /// Boot volume OCID
        #[serde(rename = "bootVolumeId")]
        boot_volume_id: String,
    },
}

/// VNIC attachment settings
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VnicDetails {
    /// Subnet OCID
    pub subnet_id: String,
    /// Always false: public IPs are attached separately
    pub assign_public_ip: bool,
    /// Register a private DNS name
    pub assign_private_dns_record: bool,
}

/// Flexible shape sizing
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ShapeConfig {
    /// OCPU count
    pub ocpus: u32,
    /// Memory in GB
    #[serde(rename = "memoryInGBs")]
    pub memory_in_gbs: u32,
}
