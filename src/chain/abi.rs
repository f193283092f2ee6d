//! Contract surfaces the state layer reads from and writes to

use alloy_primitives::{address, Address};
use alloy_sol_types::sol;

/// Multicall3 address (same on all EVM chains)
pub const MULTICALL3: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

// ============================================
// MULTICALL3 INTERFACE
// ============================================

sol! {
    /// Multicall3 - deployed at same address on all EVM chains
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls)
            external payable returns (Result[] memory returnData);
    }
}

// ============================================
// TOKEN + PAIR INTERFACES
// ============================================

sol! {
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function totalSupply() external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    interface IPair {
        function getReserves() external view returns (uint256 reserve0, uint256 reserve1, uint256 blockTimestampLast);
        function stable() external view returns (bool);
    }

    interface IRouter {
        struct Route {
            address from;
            address to;
            bool stable;
        }

        function addLiquidity(
            address tokenA, address tokenB, bool stable,
            uint256 amountADesired, uint256 amountBDesired,
            uint256 amountAMin, uint256 amountBMin,
            address to, uint256 deadline
        ) external returns (uint256 amountA, uint256 amountB, uint256 liquidity);

        function removeLiquidity(
            address tokenA, address tokenB, bool stable,
            uint256 liquidity, uint256 amountAMin, uint256 amountBMin,
            address to, uint256 deadline
        ) external returns (uint256 amountA, uint256 amountB);

        function swapExactTokensForTokens(
            uint256 amountIn, uint256 amountOutMin,
            Route[] calldata routes, address to, uint256 deadline
        ) external returns (uint256[] memory amounts);
    }
}

// ============================================
// GOVERNANCE INTERFACES
// ============================================

sol! {
    interface IVoter {
        function gauges(address pool) external view returns (address);
        function external_bribes(address gauge) external view returns (address);
        function weights(address pool) external view returns (uint256);
        function vote(uint256 tokenId, address[] calldata pools, uint256[] calldata weights) external;
        function reset(uint256 tokenId) external;
        function claimBribes(address[] calldata bribes, address[][] calldata tokens, uint256 tokenId) external;
        function claimRewards(address[] calldata gauges, address[][] calldata tokens) external;
    }

    interface IGauge {
        function balanceOf(address account) external view returns (uint256);
        function totalSupply() external view returns (uint256);
        function earned(address token, address account) external view returns (uint256);
        function deposit(uint256 amount, uint256 tokenId) external;
        function withdraw(uint256 amount) external;
        function getReward(address account, address[] calldata tokens) external;
    }

    interface IBribe {
        function rewardsListLength() external view returns (uint256);
        function rewards(uint256 index) external view returns (address);
        function rewardRate(address token) external view returns (uint256);
        function earned(address token, uint256 tokenId) external view returns (uint256);
    }

    interface IVotingEscrow {
        function balanceOf(address owner) external view returns (uint256);
        function tokenOfOwnerByIndex(address owner, uint256 index) external view returns (uint256);
        function locked(uint256 tokenId) external view returns (int128 amount, uint256 end);
        function balanceOfNFT(uint256 tokenId) external view returns (uint256);
        function voted(uint256 tokenId) external view returns (bool);
        function create_lock(uint256 value, uint256 lockDuration) external returns (uint256);
        function increase_amount(uint256 tokenId, uint256 value) external;
        function increase_unlock_time(uint256 tokenId, uint256 lockDuration) external;
        function withdraw(uint256 tokenId) external;
        function merge(uint256 from, uint256 to) external;
    }

    interface IRewardsDistributor {
        function claimable(uint256 tokenId) external view returns (uint256);
        function claim(uint256 tokenId) external returns (uint256);
    }
}
