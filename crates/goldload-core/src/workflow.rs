//! Provisioning workflow profiles.
//!
//! The Gold Load and Image workflows run the same machinery; they differ in
//! the wording shown to the user and the defaults for paths and inventory.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Workflow {
    #[default]
    GoldLoad,
    Image,
}

impl Workflow {
    pub fn name(&self) -> &'static str {
        match self {
            Workflow::GoldLoad => "gold-load",
            Workflow::Image => "image",
        }
    }

    /// Title used in headings ("Gold Load Complete!").
    pub fn title(&self) -> &'static str {
        match self {
            Workflow::GoldLoad => "Gold Load",
            Workflow::Image => "Image",
        }
    }

    /// Name of the run log as presented to the user.
    pub fn log_title(&self) -> &'static str {
        match self {
            Workflow::GoldLoad => "Gold Load",
            Workflow::Image => "Imaging",
        }
    }

    pub fn default_run_log(&self) -> &'static str {
        match self {
            Workflow::GoldLoad => "/var/log/newGoldLoad.log",
            Workflow::Image => "/var/log/newImage.log",
        }
    }

    pub fn default_driver_script(&self) -> &'static str {
        match self {
            Workflow::GoldLoad => "/Library/Application Support/JAMF/temp/DEPNotifyGoldLoad.py",
            Workflow::Image => "/Library/Application Support/JAMF/temp/DEPNotifyImage.py",
        }
    }

    pub fn complete_title(&self) -> String {
        format!("{} Complete!", self.title())
    }

    pub fn errors_title(&self) -> String {
        match self {
            Workflow::GoldLoad => "Gold Load Completed With Errors".to_string(),
            Workflow::Image => "Imaging Completed With Errors".to_string(),
        }
    }

    pub fn success_text(&self) -> String {
        let finished = match self {
            Workflow::GoldLoad => "finished Gold loading",
            Workflow::Image => "finished Imaging",
        };
        format!(
            "Congratulations! Your computer has {finished} and is now ready to be used. \
             Press the Restart button to finalize your setup and get started!"
        )
    }

    pub fn failure_text(&self) -> String {
        format!(
            "The {} has completed but some policies failed to run. \
             Please check the {} log for more information. \
             The computer will need to restart to finish applying changes. \
             Press the Restart button to continue.",
            self.title(),
            self.log_title()
        )
    }
}
