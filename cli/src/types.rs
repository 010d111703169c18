use serde::{Deserialize, Serialize};

const TEASER_CHARS: usize = 60;

/// Body returned by `POST /generate` on success.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerateResponse {
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleInput {
    pub image: &'static str,
    pub prompt: &'static str,
}

impl SampleInput {
    pub fn teaser(&self) -> String {
        let head: String = self.prompt.chars().take(TEASER_CHARS).collect();
        format!("{head}...")
    }

    pub fn label(&self) -> &'static str {
        self.image.trim_start_matches('/')
    }
}

pub const SAMPLE_INPUTS: [SampleInput; 8] = [
    SampleInput {
        image: "/armchair2.png",
        prompt: "A photo of an armchair. The armchair is in a minimalist bedroom with blue wall with a mirror, a lamp and a cute puppy.",
    },
    SampleInput {
        image: "/cat_subject.png",
        prompt: "A photo of a cat. A cat sits on a wooden table in a cozy restaurant, gently eating cat food from a small ceramic plate, surrounded by soft ambient lighting and simple décor.",
    },
    SampleInput {
        image: "/dresser_subject.png",
        prompt: "A photo of a dresser. A wooden, cane dresser in a minimalist bedroom with soft natural light and things on top of the dresser.",
    },
    SampleInput {
        image: "/mower_subject.png",
        prompt: "A photo of a lawn mower. A lawn mower is parked on a freshly mowed grassy field in a suburb.",
    },
    SampleInput {
        image: "/alpaca.jpg",
        prompt: "A photo of an alpaca. An alpaca standing on the sidewalk in downtown Manhattan.",
    },
    SampleInput {
        image: "/tv_stand.png",
        prompt: "A photo of a TV stand. A TV stand in a living room with a tv, some books and decorative items.",
    },
    SampleInput {
        image: "/adirondack_chair.png",
        prompt: "A photo of a Adirondack chair. A Adirondack chair in the backyard garden.",
    },
    SampleInput {
        image: "/throw_pillow.png",
        prompt: "A photo of a throw pillow. A textured throw pillow with woven black and white patterns, featuring braided accents and decorative short white tassels on the sides. Displayed against a clean blue background.",
    },
];
