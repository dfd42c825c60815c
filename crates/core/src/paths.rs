//! Object-store layout: one directory per project id.
//!
//! ```text
//! <project_id>/plan.json
//! <project_id>/clip_<index>_image.png
//! <project_id>/clip_<index>_audio.mp3
//! <project_id>/clip_<index>_video.mp4
//! <project_id>/final.mp4
//! ```

use crate::types::DbId;

pub const PLAN_CONTENT_TYPE: &str = "application/json";
pub const IMAGE_CONTENT_TYPE: &str = "image/png";
pub const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";
pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

pub fn plan_path(project_id: DbId) -> String {
    format!("{project_id}/plan.json")
}

pub fn clip_image_path(project_id: DbId, clip_index: i32) -> String {
    format!("{project_id}/clip_{clip_index}_image.png")
}

pub fn clip_audio_path(project_id: DbId, clip_index: i32) -> String {
    format!("{project_id}/clip_{clip_index}_audio.mp3")
}

pub fn clip_video_path(project_id: DbId, clip_index: i32) -> String {
    format!("{project_id}/clip_{clip_index}_video.mp4")
}

pub fn final_video_path(project_id: DbId) -> String {
    format!("{project_id}/final.mp4")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_share_project_directory() {
        let id: DbId = "0190f3a4-5b6c-7d8e-9f01-23456789abcd".parse().unwrap();
        assert_eq!(plan_path(id), format!("{id}/plan.json"));
        assert_eq!(clip_image_path(id, 0), format!("{id}/clip_0_image.png"));
        assert_eq!(clip_audio_path(id, 2), format!("{id}/clip_2_audio.mp3"));
        assert_eq!(clip_video_path(id, 11), format!("{id}/clip_11_video.mp4"));
        assert_eq!(final_video_path(id), format!("{id}/final.mp4"));
    }
}
