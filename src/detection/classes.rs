// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! COCO 类别表 (YOLO 系列模型默认 80 类)

use phf::phf_map;

pub const UNKNOWN_LABEL: &str = "unknown";

static COCO_CLASSES: phf::Map<u32, &'static str> = phf_map! {
    0u32 => "person", 1u32 => "bicycle", 2u32 => "car", 3u32 => "motorcycle",
    4u32 => "airplane", 5u32 => "bus", 6u32 => "train", 7u32 => "truck",
    8u32 => "boat", 9u32 => "traffic light", 10u32 => "fire hydrant",
    11u32 => "stop sign", 12u32 => "parking meter", 13u32 => "bench",
    14u32 => "bird", 15u32 => "cat", 16u32 => "dog", 17u32 => "horse",
    18u32 => "sheep", 19u32 => "cow", 20u32 => "elephant", 21u32 => "bear",
    22u32 => "zebra", 23u32 => "giraffe", 24u32 => "backpack", 25u32 => "umbrella",
    26u32 => "handbag", 27u32 => "tie", 28u32 => "suitcase", 29u32 => "frisbee",
    30u32 => "skis", 31u32 => "snowboard", 32u32 => "sports ball", 33u32 => "kite",
    34u32 => "baseball bat", 35u32 => "baseball glove", 36u32 => "skateboard",
    37u32 => "surfboard", 38u32 => "tennis racket", 39u32 => "bottle",
    40u32 => "wine glass", 41u32 => "cup", 42u32 => "fork", 43u32 => "knife",
    44u32 => "spoon", 45u32 => "bowl", 46u32 => "banana", 47u32 => "apple",
    48u32 => "sandwich", 49u32 => "orange", 50u32 => "broccoli", 51u32 => "carrot",
    52u32 => "hot dog", 53u32 => "pizza", 54u32 => "donut", 55u32 => "cake",
    56u32 => "chair", 57u32 => "couch", 58u32 => "potted plant", 59u32 => "bed",
    60u32 => "dining table", 61u32 => "toilet", 62u32 => "tv", 63u32 => "laptop",
    64u32 => "mouse", 65u32 => "remote", 66u32 => "keyboard", 67u32 => "cell phone",
    68u32 => "microwave", 69u32 => "oven", 70u32 => "toaster", 71u32 => "sink",
    72u32 => "refrigerator", 73u32 => "book", 74u32 => "clock", 75u32 => "vase",
    76u32 => "scissors", 77u32 => "teddy bear", 78u32 => "hair drier",
    79u32 => "toothbrush",
};

/// 类别ID → 名称, 未知ID返回 "unknown"
pub fn class_name(class_id: u32) -> &'static str {
    COCO_CLASSES.get(&class_id).copied().unwrap_or(UNKNOWN_LABEL)
}
