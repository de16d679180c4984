//! Source videos for end-to-end runs against a live deployment.

#[derive(Debug, Clone)]
pub struct VideoFixture {
    pub url: &'static str,
    pub should_pass: bool,
    pub description: &'static str,
}

pub const VIDEO_FIXTURES: &[VideoFixture] = &[
    VideoFixture {
        url: "https://www.youtube.com/shorts/aqz-KE-bpKQ",
        should_pass: true,
        description: "Public short with speech",
    },
    VideoFixture {
        url: "https://www.youtube.com/watch?v=jNQXAC9IVRw",
        should_pass: true,
        description: "Short landscape upload, needs reframing",
    },
    VideoFixture {
        url: "https://www.youtube.com/watch?v=xxxxxxxxxxx",
        should_pass: false,
        description: "Nonexistent video, fails at fetch",
    },
];
